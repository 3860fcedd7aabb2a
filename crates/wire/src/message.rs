//! The ETH message set and its version-aware codec.

use crate::{
    EthVersion, GetBlockBodies, GetBlockHeaders, GetNodeData, GetPooledTransactions, GetReceipts,
    MessageError, NewBlock, NewBlockHashes, NewPooledTransactionHashes, RequestPair, Status,
    Transactions,
};
use alloy_primitives::Bytes;
use alloy_rlp::{BufMut, Decodable, Encodable};
use core::fmt;
use ethp2p_consensus::{BlockBody, Header, PooledTransaction, ReceiptEnvelope};

/// Capability-relative ETH message ids.
///
/// Ids `0x0b` and `0x0c` were never assigned; `0x0d`/`0x0e` exist only up to
/// eth/66.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EthMessageId {
    /// The handshake message.
    Status = 0x00,
    /// Block-hash announcement.
    NewBlockHashes = 0x01,
    /// Full-transaction broadcast.
    Transactions = 0x02,
    /// Header request.
    GetBlockHeaders = 0x03,
    /// Header response.
    BlockHeaders = 0x04,
    /// Body request.
    GetBlockBodies = 0x05,
    /// Body response.
    BlockBodies = 0x06,
    /// Full-block announcement.
    NewBlock = 0x07,
    /// Pooled-transaction hash announcement.
    NewPooledTransactionHashes = 0x08,
    /// Pooled-transaction request.
    GetPooledTransactions = 0x09,
    /// Pooled-transaction response.
    PooledTransactions = 0x0a,
    /// Trie-node request, up to eth/66.
    GetNodeData = 0x0d,
    /// Trie-node response, up to eth/66.
    NodeData = 0x0e,
    /// Receipt request.
    GetReceipts = 0x0f,
    /// Receipt response.
    Receipts = 0x10,
}

impl EthMessageId {
    /// Number of ids the ETH capability occupies, `0x00` to `0x10`.
    pub const LENGTH: u8 = 17;

    /// True if the id exists at the given protocol version.
    pub const fn is_valid_for_version(&self, version: EthVersion) -> bool {
        match self {
            Self::GetNodeData | Self::NodeData => version.has_get_node_data(),
            Self::NewPooledTransactionHashes => (version as u8) >= 65,
            _ => true,
        }
    }

    /// True for the request half of a request/response pair.
    pub const fn is_request(&self) -> bool {
        matches!(
            self,
            Self::GetBlockHeaders
                | Self::GetBlockBodies
                | Self::GetPooledTransactions
                | Self::GetNodeData
                | Self::GetReceipts
        )
    }

    /// The response id answering this request id.
    pub const fn response_id(&self) -> Option<Self> {
        Some(match self {
            Self::GetBlockHeaders => Self::BlockHeaders,
            Self::GetBlockBodies => Self::BlockBodies,
            Self::GetPooledTransactions => Self::PooledTransactions,
            Self::GetNodeData => Self::NodeData,
            Self::GetReceipts => Self::Receipts,
            _ => return None,
        })
    }
}

impl From<EthMessageId> for u8 {
    fn from(id: EthMessageId) -> Self {
        id as Self
    }
}

impl TryFrom<u8> for EthMessageId {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Status,
            0x01 => Self::NewBlockHashes,
            0x02 => Self::Transactions,
            0x03 => Self::GetBlockHeaders,
            0x04 => Self::BlockHeaders,
            0x05 => Self::GetBlockBodies,
            0x06 => Self::BlockBodies,
            0x07 => Self::NewBlock,
            0x08 => Self::NewPooledTransactionHashes,
            0x09 => Self::GetPooledTransactions,
            0x0a => Self::PooledTransactions,
            0x0d => Self::GetNodeData,
            0x0e => Self::NodeData,
            0x0f => Self::GetReceipts,
            0x10 => Self::Receipts,
            other => return Err(MessageError::InvalidMessageId(other)),
        })
    }
}

impl fmt::Display for EthMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A decoded ETH message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EthMessage {
    /// `0x00` the handshake message.
    Status(Status),
    /// `0x01` block-hash announcement.
    NewBlockHashes(NewBlockHashes),
    /// `0x02` full-transaction broadcast.
    Transactions(Transactions),
    /// `0x03` header request.
    GetBlockHeaders(RequestPair<GetBlockHeaders>),
    /// `0x04` header response.
    BlockHeaders(RequestPair<Vec<Header>>),
    /// `0x05` body request.
    GetBlockBodies(RequestPair<GetBlockBodies>),
    /// `0x06` body response.
    BlockBodies(RequestPair<Vec<BlockBody>>),
    /// `0x07` full-block announcement.
    NewBlock(Box<NewBlock>),
    /// `0x08` pooled-transaction hash announcement.
    NewPooledTransactionHashes(NewPooledTransactionHashes),
    /// `0x09` pooled-transaction request.
    GetPooledTransactions(RequestPair<GetPooledTransactions>),
    /// `0x0a` pooled-transaction response.
    PooledTransactions(RequestPair<Vec<PooledTransaction>>),
    /// `0x0d` trie-node request, up to eth/66.
    GetNodeData(RequestPair<GetNodeData>),
    /// `0x0e` trie-node response, up to eth/66.
    NodeData(RequestPair<Vec<Bytes>>),
    /// `0x0f` receipt request.
    GetReceipts(RequestPair<GetReceipts>),
    /// `0x10` receipt response, one list per requested block.
    Receipts(RequestPair<Vec<Vec<ReceiptEnvelope>>>),
}

impl EthMessage {
    /// The message's id.
    pub const fn message_id(&self) -> EthMessageId {
        match self {
            Self::Status(_) => EthMessageId::Status,
            Self::NewBlockHashes(_) => EthMessageId::NewBlockHashes,
            Self::Transactions(_) => EthMessageId::Transactions,
            Self::GetBlockHeaders(_) => EthMessageId::GetBlockHeaders,
            Self::BlockHeaders(_) => EthMessageId::BlockHeaders,
            Self::GetBlockBodies(_) => EthMessageId::GetBlockBodies,
            Self::BlockBodies(_) => EthMessageId::BlockBodies,
            Self::NewBlock(_) => EthMessageId::NewBlock,
            Self::NewPooledTransactionHashes(_) => EthMessageId::NewPooledTransactionHashes,
            Self::GetPooledTransactions(_) => EthMessageId::GetPooledTransactions,
            Self::PooledTransactions(_) => EthMessageId::PooledTransactions,
            Self::GetNodeData(_) => EthMessageId::GetNodeData,
            Self::NodeData(_) => EthMessageId::NodeData,
            Self::GetReceipts(_) => EthMessageId::GetReceipts,
            Self::Receipts(_) => EthMessageId::Receipts,
        }
    }

    /// The request id, for the messages that carry one.
    pub const fn request_id(&self) -> Option<u64> {
        Some(match self {
            Self::GetBlockHeaders(pair) => pair.request_id,
            Self::BlockHeaders(pair) => pair.request_id,
            Self::GetBlockBodies(pair) => pair.request_id,
            Self::BlockBodies(pair) => pair.request_id,
            Self::GetPooledTransactions(pair) => pair.request_id,
            Self::PooledTransactions(pair) => pair.request_id,
            Self::GetNodeData(pair) => pair.request_id,
            Self::NodeData(pair) => pair.request_id,
            Self::GetReceipts(pair) => pair.request_id,
            Self::Receipts(pair) => pair.request_id,
            _ => return None,
        })
    }

    /// Encodes the message payload, without the id.
    pub fn encode_payload(&self, out: &mut dyn BufMut) {
        match self {
            Self::Status(msg) => msg.encode(out),
            Self::NewBlockHashes(msg) => msg.encode(out),
            Self::Transactions(msg) => msg.encode(out),
            Self::GetBlockHeaders(msg) => msg.encode(out),
            Self::BlockHeaders(msg) => msg.encode(out),
            Self::GetBlockBodies(msg) => msg.encode(out),
            Self::BlockBodies(msg) => msg.encode(out),
            Self::NewBlock(msg) => msg.encode(out),
            Self::NewPooledTransactionHashes(msg) => msg.encode(out),
            Self::GetPooledTransactions(msg) => msg.encode(out),
            Self::PooledTransactions(msg) => msg.encode(out),
            Self::GetNodeData(msg) => msg.encode(out),
            Self::NodeData(msg) => msg.encode(out),
            Self::GetReceipts(msg) => msg.encode(out),
            Self::Receipts(msg) => msg.encode(out),
        }
    }

    /// Encoded payload as a fresh buffer.
    pub fn encoded_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_payload(&mut out);
        out
    }

    /// Decodes the payload of the message with the given id, enforcing the
    /// negotiated version's message set and shapes.
    pub fn decode(
        id: EthMessageId,
        version: EthVersion,
        buf: &mut &[u8],
    ) -> Result<Self, MessageError> {
        if !id.is_valid_for_version(version) {
            return Err(MessageError::InvalidMessageForVersion { message: id, version });
        }
        Ok(match id {
            EthMessageId::Status => Self::Status(Status::decode(buf)?),
            EthMessageId::NewBlockHashes => Self::NewBlockHashes(NewBlockHashes::decode(buf)?),
            EthMessageId::Transactions => Self::Transactions(Transactions::decode(buf)?),
            EthMessageId::GetBlockHeaders => Self::GetBlockHeaders(RequestPair::decode(buf)?),
            EthMessageId::BlockHeaders => Self::BlockHeaders(RequestPair::decode(buf)?),
            EthMessageId::GetBlockBodies => Self::GetBlockBodies(RequestPair::decode(buf)?),
            EthMessageId::BlockBodies => Self::BlockBodies(RequestPair::decode(buf)?),
            EthMessageId::NewBlock => Self::NewBlock(Box::new(NewBlock::decode(buf)?)),
            EthMessageId::NewPooledTransactionHashes => Self::NewPooledTransactionHashes(
                NewPooledTransactionHashes::decode_for_version(version, buf)?,
            ),
            EthMessageId::GetPooledTransactions => {
                Self::GetPooledTransactions(RequestPair::decode(buf)?)
            }
            EthMessageId::PooledTransactions => {
                Self::PooledTransactions(RequestPair::decode(buf)?)
            }
            EthMessageId::GetNodeData => Self::GetNodeData(RequestPair::decode(buf)?),
            EthMessageId::NodeData => Self::NodeData(RequestPair::decode(buf)?),
            EthMessageId::GetReceipts => Self::GetReceipts(RequestPair::decode(buf)?),
            EthMessageId::Receipts => Self::Receipts(RequestPair::decode(buf)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockHashOrNumber, ForkHash, ForkId, NewPooledTransactionHashes68};
    use alloy_primitives::{B256, U256};
    use assert_matches::assert_matches;

    fn roundtrip(message: EthMessage, version: EthVersion) {
        let payload = message.encoded_payload();
        let decoded =
            EthMessage::decode(message.message_id(), version, &mut payload.as_slice()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn status_roundtrip() {
        let status = Status::builder()
            .version(EthVersion::Eth68)
            .chain(1)
            .total_difficulty(U256::from(100u64))
            .blockhash(B256::repeat_byte(1))
            .genesis(B256::repeat_byte(2))
            .forkid(ForkId { hash: ForkHash([1, 2, 3, 4]), next: 200 })
            .build();
        roundtrip(EthMessage::Status(status), EthVersion::Eth68);
    }

    #[test]
    fn request_response_roundtrips() {
        roundtrip(
            EthMessage::GetBlockHeaders(RequestPair {
                request_id: 5,
                message: GetBlockHeaders {
                    start_block: BlockHashOrNumber::Number(100),
                    limit: 10,
                    skip: 0,
                    reverse: false,
                },
            }),
            EthVersion::Eth68,
        );
        roundtrip(
            EthMessage::BlockHeaders(RequestPair { request_id: 5, message: vec![Header::default()] }),
            EthVersion::Eth68,
        );
        roundtrip(
            EthMessage::GetReceipts(RequestPair {
                request_id: 9,
                message: GetReceipts(vec![B256::repeat_byte(3)]),
            }),
            EthVersion::Eth68,
        );
        roundtrip(
            EthMessage::NodeData(RequestPair {
                request_id: 2,
                message: vec![Bytes::from(vec![1, 2, 3])],
            }),
            EthVersion::Eth66,
        );
    }

    #[test]
    fn get_node_data_rejected_from_eth67() {
        let payload = EthMessage::GetNodeData(RequestPair {
            request_id: 1,
            message: GetNodeData(vec![B256::repeat_byte(1)]),
        })
        .encoded_payload();

        for version in [EthVersion::Eth67, EthVersion::Eth68] {
            assert_matches!(
                EthMessage::decode(EthMessageId::GetNodeData, version, &mut payload.as_slice()),
                Err(MessageError::InvalidMessageForVersion {
                    message: EthMessageId::GetNodeData,
                    ..
                })
            );
        }
        assert!(EthMessage::decode(
            EthMessageId::GetNodeData,
            EthVersion::Eth66,
            &mut payload.as_slice()
        )
        .is_ok());
    }

    #[test]
    fn announcement_shape_follows_version() {
        let hashes = vec![B256::repeat_byte(7)];
        let eth68_message = EthMessage::NewPooledTransactionHashes(
            NewPooledTransactionHashes::Eth68(NewPooledTransactionHashes68 {
                types: alloy_primitives::Bytes::from(vec![0x02]),
                sizes: vec![100],
                hashes: hashes.clone(),
            }),
        );
        roundtrip(eth68_message.clone(), EthVersion::Eth68);

        // the eth/68 triple does not decode as an eth/67 announcement
        let payload = eth68_message.encoded_payload();
        assert!(EthMessage::decode(
            EthMessageId::NewPooledTransactionHashes,
            EthVersion::Eth67,
            &mut payload.as_slice()
        )
        .is_err());
    }

    #[test]
    fn unassigned_ids_rejected() {
        assert_matches!(
            EthMessageId::try_from(0x0b),
            Err(MessageError::InvalidMessageId(0x0b))
        );
        assert_matches!(
            EthMessageId::try_from(0x0c),
            Err(MessageError::InvalidMessageId(0x0c))
        );
        assert_matches!(
            EthMessageId::try_from(0x11),
            Err(MessageError::InvalidMessageId(0x11))
        );
    }
}
