//! Transaction codec errors.

/// Errors produced while decoding or validating a transaction.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// The underlying RLP was malformed.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
    /// A type byte that does not map to a known transaction variant.
    #[error("unexpected transaction type flag: {0}")]
    UnexpectedType(u8),
    /// A blob transaction without a `to` address.
    #[error("blob transactions cannot create contracts")]
    BlobTxMissingTo,
    /// A blob transaction without any versioned hashes.
    #[error("blob transactions must carry at least one versioned hash")]
    EmptyVersionedHashes,
    /// A versioned hash whose version byte is not the KZG version.
    #[error("invalid versioned hash version byte: {0:#04x}")]
    InvalidVersionedHash(u8),
    /// More blobs than the per-transaction maximum.
    #[error("transaction carries {have} blobs, maximum is {max}")]
    TooManyBlobs {
        /// Number of versioned hashes on the transaction.
        have: usize,
        /// Configured per-transaction maximum.
        max: usize,
    },
    /// A sidecar wrapper version outside the supported set.
    #[error("unsupported blob sidecar wrapper version: {0}")]
    UnsupportedSidecarVersion(u8),
    /// Sidecar blob, commitment and proof counts disagree.
    #[error("blob sidecar has mismatched field lengths")]
    SidecarLengthMismatch,
    /// A blob transaction that must travel with its sidecar does not have
    /// one.
    #[error("blob transaction is missing its sidecar")]
    MissingSidecar,
    /// A set-code transaction without a `to` address.
    #[error("set-code transactions cannot create contracts")]
    SetCodeMissingTo,
    /// A set-code transaction with an empty authorization list.
    #[error("set-code transactions must carry at least one authorization")]
    EmptyAuthorizationList,
}
