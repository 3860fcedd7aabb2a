//! Signer errors.

use alloy_primitives::ChainId;
use ethp2p_consensus::TxType;

/// Errors produced while signing transactions or recovering their senders.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The transaction's chain id does not match the signer's.
    #[error("transaction chain id {tx:?} does not match signer chain id {signer}")]
    ChainIdMismatch {
        /// The chain id carried by the transaction.
        tx: Option<ChainId>,
        /// The chain id the signer operates on.
        signer: ChainId,
    },
    /// The transaction variant is not accepted at the signer's hardfork.
    #[error("transaction type {0} is not supported at this hardfork")]
    UnsupportedVariant(TxType),
    /// A replay-protected legacy transaction before Spurious Dragon.
    #[error("EIP-155 replay protection is not active at this hardfork")]
    ReplayProtectionUnsupported,
    /// A signature S value in the upper half of the curve order where the
    /// Homestead rule applies.
    #[error("signature S value exceeds secp256k1n/2")]
    HighS,
    /// A raw signature whose recovery byte is out of range.
    #[error("invalid signature recovery id: {0}")]
    InvalidRecoveryId(u8),
    /// Sender recovery failed.
    #[error(transparent)]
    Recovery(#[from] ethp2p_consensus::crypto::RecoveryError),
    /// Signing failed in the underlying curve library.
    #[error("signing failed: {0}")]
    Signing(#[from] ethp2p_consensus::secp256k1::Error),
}
