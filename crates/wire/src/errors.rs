//! Codec and handshake errors.

use crate::EthVersion;
use alloy_primitives::{B256, U256};

/// Errors decoding or version-checking an ETH message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Malformed RLP.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
    /// A message id outside the ETH code space.
    #[error("invalid ETH message id: {0}")]
    InvalidMessageId(u8),
    /// A message that does not exist at the negotiated version.
    #[error("message {message:?} is not valid at {version}")]
    InvalidMessageForVersion {
        /// The offending message id.
        message: crate::EthMessageId,
        /// The negotiated protocol version.
        version: EthVersion,
    },
    /// The three lists of an eth/68 hash announcement must be equally long.
    #[error("hash announcement lists have mismatched lengths")]
    HashAnnouncementLengthMismatch,
}

/// Errors validating a peer's STATUS against the local chain view.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// The peer speaks a different protocol version than negotiated.
    #[error("protocol version mismatch: ours {ours}, peer {peer}")]
    VersionMismatch {
        /// Our negotiated version.
        ours: u8,
        /// The version in the peer's STATUS.
        peer: u8,
    },
    /// The peer is on a different network.
    #[error("chain id mismatch: ours {ours}, peer {peer}")]
    ChainMismatch {
        /// Our chain id.
        ours: u64,
        /// The peer's chain id.
        peer: u64,
    },
    /// The peer's genesis differs from ours.
    #[error("genesis hash mismatch: ours {ours}, peer {peer}")]
    GenesisMismatch {
        /// Our genesis hash.
        ours: B256,
        /// The peer's genesis hash.
        peer: B256,
    },
    /// The peer's fork id is incompatible with our chain view
    /// ([EIP-2124](https://eips.ethereum.org/EIPS/eip-2124)).
    #[error("fork id validation failed: {0:?}")]
    ForkIdRejected(alloy_eip2124::ValidationError),
    /// A total difficulty large enough to be nonsensical, used as a
    /// plausibility guard.
    #[error("total difficulty {0} is implausible")]
    ImplausibleTotalDifficulty(U256),
    /// A second STATUS message on an established session.
    #[error("duplicate STATUS message")]
    Duplicate,
    /// A non-STATUS message before the STATUS exchange completed.
    #[error("expected STATUS, got {0}")]
    ExpectedStatus(crate::EthMessageId),
}
