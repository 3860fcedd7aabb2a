//! Announcement messages: new blocks, transactions, and pooled-transaction
//! hashes.

use crate::{EthVersion, MessageError};
use alloy_primitives::{Bytes, B256, U256};
use alloy_rlp::{
    Decodable, Encodable, RlpDecodable, RlpDecodableWrapper, RlpEncodable, RlpEncodableWrapper,
};
use ethp2p_consensus::{Block, TxEnvelope};

/// A block hash and its height, the element of `NewBlockHashes`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BlockHashNumber {
    /// The announced block hash.
    pub hash: B256,
    /// The announced block height.
    pub number: u64,
}

/// `NewBlockHashes`: blocks the peer considers new, by hash and height.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodableWrapper, RlpDecodableWrapper)]
pub struct NewBlockHashes(
    /// The announced hashes.
    pub Vec<BlockHashNumber>,
);

/// `NewBlock`: a freshly mined block and the total difficulty of the chain
/// it extends.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct NewBlock {
    /// The announced block.
    pub block: Block,
    /// Total difficulty including this block.
    pub td: U256,
}

/// `Transactions`: full transactions the peer deems worth propagating.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodableWrapper, RlpDecodableWrapper)]
pub struct Transactions(
    /// The broadcast transactions.
    pub Vec<TxEnvelope>,
);

/// `NewPooledTransactionHashes` in the eth/65 to eth/67 shape: a bare list
/// of hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodableWrapper, RlpDecodableWrapper)]
pub struct NewPooledTransactionHashes66(
    /// The announced transaction hashes.
    pub Vec<B256>,
);

/// `NewPooledTransactionHashes` in the eth/68 shape:
/// `[types, [sizes], [hashes]]`, so a peer can prioritise fetches without
/// the bodies.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct NewPooledTransactionHashes68 {
    /// The EIP-2718 type of each announced transaction, one byte each.
    pub types: Bytes,
    /// The encoded size of each announced transaction.
    pub sizes: Vec<u32>,
    /// The announced transaction hashes.
    pub hashes: Vec<B256>,
}

impl NewPooledTransactionHashes68 {
    /// The three lists must be equally long.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.types.len() != self.hashes.len() || self.sizes.len() != self.hashes.len() {
            return Err(MessageError::HashAnnouncementLengthMismatch);
        }
        Ok(())
    }
}

/// A pooled-transaction hash announcement in whichever shape the negotiated
/// version prescribes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NewPooledTransactionHashes {
    /// The eth/65 to eth/67 shape.
    Eth66(NewPooledTransactionHashes66),
    /// The eth/68 shape.
    Eth68(NewPooledTransactionHashes68),
}

impl NewPooledTransactionHashes {
    /// The announced hashes, shape-independent.
    pub fn hashes(&self) -> &[B256] {
        match self {
            Self::Eth66(msg) => &msg.0,
            Self::Eth68(msg) => &msg.hashes,
        }
    }

    /// Number of announced transactions.
    pub fn len(&self) -> usize {
        self.hashes().len()
    }

    /// True if nothing is announced.
    pub fn is_empty(&self) -> bool {
        self.hashes().is_empty()
    }

    /// True if the shape matches what the version prescribes.
    pub const fn is_valid_for_version(&self, version: EthVersion) -> bool {
        match self {
            Self::Eth66(_) => !version.has_typed_announcements(),
            Self::Eth68(_) => version.has_typed_announcements(),
        }
    }

    /// Decodes the shape the version prescribes.
    pub fn decode_for_version(
        version: EthVersion,
        buf: &mut &[u8],
    ) -> Result<Self, MessageError> {
        if version.has_typed_announcements() {
            let msg = NewPooledTransactionHashes68::decode(buf)?;
            msg.validate()?;
            Ok(Self::Eth68(msg))
        } else {
            Ok(Self::Eth66(NewPooledTransactionHashes66::decode(buf)?))
        }
    }
}

impl Encodable for NewPooledTransactionHashes {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        match self {
            Self::Eth66(msg) => msg.encode(out),
            Self::Eth68(msg) => msg.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Eth66(msg) => msg.length(),
            Self::Eth68(msg) => msg.length(),
        }
    }
}
