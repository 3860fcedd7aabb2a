//! Hardfork identifiers ordered by activation.

use core::fmt;

/// Named protocol upgrades, ordered by mainnet activation.
///
/// Only forks that changed transaction validity, signing rules or gas
/// accounting are listed; the ordinal ordering is what the codec relies on.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hardfork {
    /// Frontier, the genesis rule set.
    Frontier = 0,
    /// Homestead ([EIP-2](https://eips.ethereum.org/EIPS/eip-2)): low-s rule,
    /// creation gas.
    Homestead = 1,
    /// Tangerine Whistle (EIP-150).
    TangerineWhistle = 2,
    /// Spurious Dragon ([EIP-155](https://eips.ethereum.org/EIPS/eip-155)):
    /// replay protection.
    SpuriousDragon = 3,
    /// Byzantium: receipts carry a status code instead of a state root.
    Byzantium = 4,
    /// Constantinople/Petersburg.
    Constantinople = 5,
    /// Istanbul ([EIP-2028](https://eips.ethereum.org/EIPS/eip-2028)):
    /// cheaper calldata.
    Istanbul = 6,
    /// Berlin (EIP-2718/EIP-2930): typed transactions, access lists.
    Berlin = 7,
    /// London (EIP-1559): dynamic-fee transactions.
    London = 8,
    /// Paris, the merge.
    Paris = 9,
    /// Shanghai (EIP-3860): initcode metering, withdrawals.
    Shanghai = 10,
    /// Cancun (EIP-4844): blob transactions.
    Cancun = 11,
    /// Prague (EIP-7702/EIP-7623): set-code transactions, calldata floor.
    #[default]
    Prague = 12,
}

impl Hardfork {
    /// Returns `true` if `self` is at or past the given fork.
    #[inline]
    pub const fn is_enabled_in(&self, other: Self) -> bool {
        *self as u8 >= other as u8
    }

    /// The fork by canonical name, if known.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Frontier" => Self::Frontier,
            "Homestead" => Self::Homestead,
            "TangerineWhistle" => Self::TangerineWhistle,
            "SpuriousDragon" => Self::SpuriousDragon,
            "Byzantium" => Self::Byzantium,
            "Constantinople" | "Petersburg" => Self::Constantinople,
            "Istanbul" => Self::Istanbul,
            "Berlin" => Self::Berlin,
            "London" => Self::London,
            "Paris" | "Merge" => Self::Paris,
            "Shanghai" => Self::Shanghai,
            "Cancun" => Self::Cancun,
            "Prague" => Self::Prague,
            _ => return None,
        })
    }
}

impl fmt::Display for Hardfork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_activation() {
        assert!(Hardfork::Prague.is_enabled_in(Hardfork::Cancun));
        assert!(Hardfork::Cancun.is_enabled_in(Hardfork::London));
        assert!(!Hardfork::Homestead.is_enabled_in(Hardfork::SpuriousDragon));
        assert!(Hardfork::Frontier.is_enabled_in(Hardfork::Frontier));
    }
}
