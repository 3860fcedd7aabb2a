//! Intrinsic gas accounting.

use crate::{constants::*, Hardfork};
use alloy_eip2930::AccessList;

/// The gas parameters in force at a given hardfork.
///
/// Rules are selected by table lookup rather than by fork checks scattered
/// through the calculation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasSchedule {
    /// Base stipend of every transaction.
    pub tx_gas: u64,
    /// Extra stipend for contract creation, zero before Homestead.
    pub creation_gas: u64,
    /// Cost per zero byte of data.
    pub data_zero_gas: u64,
    /// Cost per non-zero byte of data.
    pub data_non_zero_gas: u64,
    /// Cost per access-list address, zero before Berlin.
    pub access_list_address_gas: u64,
    /// Cost per access-list storage key, zero before Berlin.
    pub access_list_storage_key_gas: u64,
    /// Cost per 32-byte initcode word, `None` before Shanghai.
    pub initcode_word_gas: Option<u64>,
    /// Cost per authorization tuple, `None` before Prague.
    pub authorization_gas: Option<u64>,
    /// Calldata floor cost per token, `None` before Prague.
    pub floor_gas_per_token: Option<u64>,
}

impl GasSchedule {
    /// Returns the schedule in force at the given fork.
    pub const fn for_hardfork(fork: Hardfork) -> Self {
        Self {
            tx_gas: TX_GAS,
            creation_gas: if fork.is_enabled_in(Hardfork::Homestead) { TX_CREATION_GAS } else { 0 },
            data_zero_gas: TX_DATA_ZERO_GAS,
            data_non_zero_gas: if fork.is_enabled_in(Hardfork::Istanbul) {
                TX_DATA_NON_ZERO_GAS_EIP2028
            } else {
                TX_DATA_NON_ZERO_GAS_FRONTIER
            },
            access_list_address_gas: if fork.is_enabled_in(Hardfork::Berlin) {
                ACCESS_LIST_ADDRESS_GAS
            } else {
                0
            },
            access_list_storage_key_gas: if fork.is_enabled_in(Hardfork::Berlin) {
                ACCESS_LIST_STORAGE_KEY_GAS
            } else {
                0
            },
            initcode_word_gas: if fork.is_enabled_in(Hardfork::Shanghai) {
                Some(INITCODE_WORD_GAS)
            } else {
                None
            },
            authorization_gas: if fork.is_enabled_in(Hardfork::Prague) {
                Some(PER_EMPTY_ACCOUNT_GAS)
            } else {
                None
            },
            floor_gas_per_token: if fork.is_enabled_in(Hardfork::Prague) {
                Some(TOTAL_COST_FLOOR_PER_TOKEN)
            } else {
                None
            },
        }
    }
}

/// Minimum gas any execution of the transaction must consume before payload
/// execution.
///
/// Contains the base stipend, the data cost, the access-list cost, the
/// Shanghai initcode stipend for creations and, when the Prague floor is in
/// force, the [EIP-7623](https://eips.ethereum.org/EIPS/eip-7623) calldata
/// floor.
pub fn intrinsic_gas(
    fork: Hardfork,
    input: &[u8],
    is_create: bool,
    access_list: Option<&AccessList>,
    authorization_count: u64,
) -> u64 {
    let schedule = GasSchedule::for_hardfork(fork);

    let zero_data_len = input.iter().filter(|v| **v == 0).count() as u64;
    let non_zero_data_len = input.len() as u64 - zero_data_len;

    let mut gas = schedule.tx_gas;
    gas += zero_data_len * schedule.data_zero_gas;
    gas += non_zero_data_len * schedule.data_non_zero_gas;

    if let Some(list) = access_list {
        let storage_keys = list.0.iter().map(|item| item.storage_keys.len() as u64).sum::<u64>();
        gas += list.0.len() as u64 * schedule.access_list_address_gas;
        gas += storage_keys * schedule.access_list_storage_key_gas;
    }

    if is_create {
        gas += schedule.creation_gas;
        if let Some(word_gas) = schedule.initcode_word_gas {
            gas += word_gas * input.len().div_ceil(32) as u64;
        }
    }

    if let Some(auth_gas) = schedule.authorization_gas {
        gas += auth_gas * authorization_count;
    }

    if let Some(floor_per_token) = schedule.floor_gas_per_token {
        let tokens = zero_data_len + non_zero_data_len * NON_ZERO_BYTE_TOKEN_WEIGHT;
        gas = gas.max(schedule.tx_gas + floor_per_token * tokens);
    }

    gas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tx_frontier() {
        assert_eq!(intrinsic_gas(Hardfork::Frontier, &[], false, None, 0), 21_000);
    }

    #[test]
    fn creation_stipend_from_homestead() {
        // pre-Homestead contract creation costs no extra gas
        assert_eq!(intrinsic_gas(Hardfork::Frontier, &[], true, None, 0), 21_000);
        assert_eq!(intrinsic_gas(Hardfork::Homestead, &[], true, None, 0), 53_000);
    }

    #[test]
    fn calldata_pricing_per_fork() {
        let data = [0u8, 1, 2, 0];
        assert_eq!(
            intrinsic_gas(Hardfork::Homestead, &data, false, None, 0),
            21_000 + 2 * 4 + 2 * 68
        );
        assert_eq!(
            intrinsic_gas(Hardfork::Istanbul, &data, false, None, 0),
            21_000 + 2 * 4 + 2 * 16
        );
    }

    #[test]
    fn initcode_words_counted_from_shanghai() {
        let data = vec![1u8; 33];
        let cancun = intrinsic_gas(Hardfork::Cancun, &data, true, None, 0);
        let london = intrinsic_gas(Hardfork::London, &data, true, None, 0);
        assert_eq!(cancun - london, 2 * 2); // two words
    }

    #[test]
    fn prague_floor_applies() {
        // 100 non-zero bytes: intrinsic = 21000 + 1600, floor = 21000 + 4000
        let data = vec![1u8; 100];
        assert_eq!(intrinsic_gas(Hardfork::Prague, &data, false, None, 0), 21_000 + 4_000);
        assert_eq!(intrinsic_gas(Hardfork::Cancun, &data, false, None, 0), 21_000 + 1_600);
    }

    #[test]
    fn monotonic_in_data_len() {
        let mut prev = 0;
        for len in 0..64 {
            let gas = intrinsic_gas(Hardfork::Cancun, &vec![1u8; len], false, None, 0);
            assert!(gas >= prev);
            prev = gas;
        }
    }
}
