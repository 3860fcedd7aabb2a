use crate::{
    crypto::{self, RecoveryError},
    transaction::SignableTransaction,
};
use alloy_primitives::{Address, Signature, B256};
use std::sync::OnceLock;

/// A transaction with a signature and hash seal.
///
/// The transaction value is immutable once constructed; the recovered sender
/// is memoised on first access.
#[derive(Clone, Debug)]
pub struct Signed<T> {
    tx: T,
    signature: Signature,
    hash: B256,
    signer: OnceLock<Address>,
}

impl<T: PartialEq> PartialEq for Signed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.tx == other.tx && self.signature == other.signature && self.hash == other.hash
    }
}

impl<T: Eq> Eq for Signed<T> {}

impl<T> Signed<T> {
    /// Instantiate from a transaction, signature and hash. Does not verify
    /// the signature.
    pub fn new_unchecked(tx: T, signature: Signature, hash: B256) -> Self {
        Self { tx, signature, hash, signer: OnceLock::new() }
    }

    /// Returns a reference to the transaction.
    pub const fn tx(&self) -> &T {
        &self.tx
    }

    /// Returns a reference to the signature.
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns a reference to the transaction hash.
    pub const fn hash(&self) -> &B256 {
        &self.hash
    }

    /// Splits the seal into its parts.
    pub fn into_parts(self) -> (T, Signature, B256) {
        (self.tx, self.signature, self.hash)
    }

    /// Returns the transaction without its signature.
    pub fn strip_signature(self) -> T {
        self.tx
    }

    /// Returns the memoised signer, if it has been recovered before.
    pub fn cached_signer(&self) -> Option<Address> {
        self.signer.get().copied()
    }
}

impl<T: SignableTransaction> Signed<T> {
    /// Calculate the signing hash for the transaction.
    pub fn signature_hash(&self) -> B256 {
        self.tx.signature_hash()
    }

    /// Recover the signer of the transaction, enforcing the
    /// [EIP-2](https://eips.ethereum.org/EIPS/eip-2) low-s rule.
    ///
    /// The result is memoised; repeated calls are free.
    pub fn recover_signer(&self) -> Result<Address, RecoveryError> {
        if let Some(signer) = self.signer.get() {
            return Ok(*signer);
        }
        let signer = crypto::recover_signer(&self.signature, self.tx.signature_hash())?;
        let _ = self.signer.set(signer);
        Ok(signer)
    }

    /// Recover the signer without the low-s check, for pre-Homestead
    /// signatures.
    pub fn recover_signer_unchecked(&self) -> Result<Address, RecoveryError> {
        if let Some(signer) = self.signer.get() {
            return Ok(*signer);
        }
        let signer = crypto::recover_signer_unchecked(&self.signature, self.tx.signature_hash())?;
        let _ = self.signer.set(signer);
        Ok(signer)
    }
}
