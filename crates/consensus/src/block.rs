//! Blocks and block bodies as exchanged in `BlockBodies` and `NewBlock`
//! messages.

use crate::{Header, TxEnvelope};
use alloy_primitives::Address;
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A validator withdrawal ([EIP-4895](https://eips.ethereum.org/EIPS/eip-4895)).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Withdrawal {
    /// Monotonically increasing identifier issued by the consensus layer.
    pub index: u64,
    /// Index of the validator associated with the withdrawal.
    pub validator_index: u64,
    /// Target address of the withdrawn ether.
    pub address: Address,
    /// Value of the withdrawal in gwei.
    pub amount: u64,
}

/// A block body: the transactions, the ommers and, from Shanghai, the
/// withdrawals.
///
/// The trailing withdrawals list is optional on the wire; pre-Shanghai bodies
/// simply omit it.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[rlp(trailing)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockBody {
    /// The block's transactions.
    pub transactions: Vec<TxEnvelope>,
    /// Headers of the block's uncles.
    pub ommers: Vec<Header>,
    /// Validator withdrawals, present from Shanghai.
    pub withdrawals: Option<Vec<Withdrawal>>,
}

/// A complete block, as announced in `NewBlock`.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[rlp(trailing)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// The block's transactions.
    pub transactions: Vec<TxEnvelope>,
    /// Headers of the block's uncles.
    pub ommers: Vec<Header>,
    /// Validator withdrawals, present from Shanghai.
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl Block {
    /// Splits the block into its header and body.
    pub fn split(self) -> (Header, BlockBody) {
        (
            self.header,
            BlockBody {
                transactions: self.transactions,
                ommers: self.ommers,
                withdrawals: self.withdrawals,
            },
        )
    }

    /// Assembles a block from a header and body.
    pub fn from_parts(header: Header, body: BlockBody) -> Self {
        Self {
            header,
            transactions: body.transactions,
            ommers: body.ommers,
            withdrawals: body.withdrawals,
        }
    }

    /// The block hash, computed from the header.
    pub fn hash_slow(&self) -> alloy_primitives::B256 {
        self.header.hash_slow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SignableTransaction, TxLegacy};
    use alloy_primitives::{Signature, TxKind, U256};
    use alloy_rlp::{Decodable, Encodable};

    fn sample_tx() -> TxEnvelope {
        TxLegacy {
            chain_id: Some(1),
            nonce: 1,
            gas_price: 10,
            gas_limit: 21_000,
            to: TxKind::Create,
            value: U256::ZERO,
            input: Default::default(),
        }
        .into_signed(Signature::new(U256::from(1u64), U256::from(2u64), false))
        .into()
    }

    #[test]
    fn body_roundtrip_without_withdrawals() {
        let body = BlockBody {
            transactions: vec![sample_tx()],
            ommers: vec![Header::default()],
            withdrawals: None,
        };
        let mut buf = Vec::new();
        body.encode(&mut buf);
        let decoded = BlockBody::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn body_roundtrip_with_withdrawals() {
        let body = BlockBody {
            transactions: vec![sample_tx(), sample_tx()],
            ommers: vec![],
            withdrawals: Some(vec![Withdrawal {
                index: 5,
                validator_index: 9,
                address: Address::repeat_byte(0xaa),
                amount: 123,
            }]),
        };
        let mut buf = Vec::new();
        body.encode(&mut buf);
        let decoded = BlockBody::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn block_split_and_assemble() {
        let block = Block {
            header: Header { number: 10, ..Default::default() },
            transactions: vec![sample_tx()],
            ommers: vec![],
            withdrawals: Some(vec![]),
        };
        let (header, body) = block.clone().split();
        assert_eq!(Block::from_parts(header, body), block);
    }
}
