//! Transaction types.

use crate::{eip2718::Typed2718, Signed};
use alloy_eip2930::AccessList;
use alloy_eip7702::SignedAuthorization;
use alloy_primitives::{keccak256, Address, Bytes, ChainId, Signature, TxKind, B256, U256};
use alloy_rlp::{BufMut, Decodable, Encodable};
use core::fmt;

mod legacy;
pub use legacy::{from_eip155_value, to_eip155_value, TxLegacy};

mod eip2930;
pub use eip2930::TxEip2930;

mod eip1559;
pub use eip1559::TxEip1559;

mod eip4844;
pub use eip4844::{TxEip4844, TxEip4844Variant, TxEip4844WithSidecar};

mod sidecar;
pub use sidecar::{Blob, BlobTransactionSidecar, BlobTransactionSidecarV1, Bytes48, TxSidecar};

mod eip7702;
pub use eip7702::TxEip7702;

mod envelope;
pub use envelope::TxEnvelope;

mod pooled;
pub use pooled::PooledTransaction;

mod tx_type;
pub use tx_type::TxType;

use crate::constants::DATA_GAS_PER_BLOB;

/// Represents a minimal EVM transaction.
///
/// EIP-1559, EIP-4844 and EIP-7702 transactions carry dynamic fees; we call
/// the rest "legacy fee" transactions.
pub trait Transaction: Typed2718 + fmt::Debug + Send + Sync + 'static {
    /// Get `chain_id`.
    fn chain_id(&self) -> Option<ChainId>;

    /// Get `nonce`.
    fn nonce(&self) -> u64;

    /// Get `gas_limit`.
    fn gas_limit(&self) -> u64;

    /// Get `gas_price`. Returns `None` for dynamic fee transactions.
    fn gas_price(&self) -> Option<u128>;

    /// For dynamic fee transactions the maximum fee per gas the caller is
    /// willing to pay, for legacy fee transactions the `gas_price`.
    fn max_fee_per_gas(&self) -> u128;

    /// The priority fee the caller pays to the block author, `None` for
    /// legacy fee transactions.
    fn max_priority_fee_per_gas(&self) -> Option<u128>;

    /// Max fee per blob gas, `None` for non-EIP-4844 transactions.
    fn max_fee_per_blob_gas(&self) -> Option<u128>;

    /// Returns the effective gas price for the given base fee.
    ///
    /// For legacy fee transactions this is the gas price; an undefined base
    /// fee yields the fee cap.
    fn effective_gas_price(&self, base_fee: Option<u64>) -> u128;

    /// Returns the effective tip for this transaction, or `None` if the base
    /// fee exceeds the fee cap.
    ///
    /// For dynamic fee transactions: `min(max_fee_per_gas - base_fee,
    /// max_priority_fee_per_gas)`. For legacy fee transactions:
    /// `gas_price - base_fee`.
    fn effective_tip_per_gas(&self, base_fee: u64) -> Option<u128> {
        let base_fee = base_fee as u128;
        let max_fee_per_gas = self.max_fee_per_gas();

        if max_fee_per_gas < base_fee {
            return None;
        }

        let fee = max_fee_per_gas - base_fee;
        self.max_priority_fee_per_gas()
            .map_or(Some(fee), |priority_fee| Some(fee.min(priority_fee)))
    }

    /// Returns `true` if the transaction supports dynamic fees.
    fn is_dynamic_fee(&self) -> bool;

    /// Returns the transaction kind.
    fn kind(&self) -> TxKind;

    /// Returns true if the transaction is a contract creation.
    fn is_create(&self) -> bool {
        self.kind().is_create()
    }

    /// The call target, or `None` for creations.
    fn to(&self) -> Option<Address> {
        self.kind().to().copied()
    }

    /// Get `value`.
    fn value(&self) -> U256;

    /// Get `data`.
    fn input(&self) -> &Bytes;

    /// The EIP-2930 access list, `None` for older transaction types.
    fn access_list(&self) -> Option<&AccessList>;

    /// Blob versioned hashes, `None` for non-EIP-4844 transactions.
    fn blob_versioned_hashes(&self) -> Option<&[B256]>;

    /// The number of blobs of this transaction, `None` for non-EIP-4844
    /// transactions.
    fn blob_count(&self) -> Option<u64> {
        self.blob_versioned_hashes().map(|h| h.len() as u64)
    }

    /// Total gas for all blobs in this transaction, `None` for non-EIP-4844
    /// transactions.
    fn blob_gas_used(&self) -> Option<u64> {
        self.blob_count().map(|blobs| blobs * DATA_GAS_PER_BLOB)
    }

    /// The EIP-7702 authorization list, `None` for other transaction types.
    fn authorization_list(&self) -> Option<&[SignedAuthorization]>;
}

/// A transaction that can be signed: it knows its signing encoding and how to
/// seal itself with a signature.
pub trait SignableTransaction: Transaction {
    /// Sets `chain_id`.
    fn set_chain_id(&mut self, chain_id: ChainId);

    /// RLP-encodes the transaction for signing.
    fn encode_for_signing(&self, out: &mut dyn BufMut);

    /// Returns the length of the RLP-encoded transaction for signing.
    fn payload_len_for_signature(&self) -> usize;

    /// RLP-encodes the transaction for signing into a fresh buffer.
    fn encoded_for_signing(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload_len_for_signature());
        self.encode_for_signing(&mut buf);
        buf
    }

    /// Calculate the signing hash for the transaction.
    fn signature_hash(&self) -> B256 {
        keccak256(self.encoded_for_signing())
    }

    /// Convert to a [`Signed`] object.
    fn into_signed(self, signature: Signature) -> Signed<Self>
    where
        Self: Sized;
}

/// Encodes `v ∥ r ∥ s` with the given v value.
pub(crate) fn encode_signature_fields<V: Encodable>(
    signature: &Signature,
    v: V,
    out: &mut dyn BufMut,
) {
    v.encode(out);
    signature.r().encode(out);
    signature.s().encode(out);
}

/// RLP length of `v ∥ r ∥ s` with the given v value.
pub(crate) fn signature_fields_len<V: Encodable>(signature: &Signature, v: V) -> usize {
    v.length() + signature.r().length() + signature.s().length()
}

/// Decodes a typed-transaction signature: parity bit, then r and s.
pub(crate) fn decode_signature_typed(buf: &mut &[u8]) -> alloy_rlp::Result<Signature> {
    let parity = bool::decode(buf)?;
    let r = U256::decode(buf)?;
    let s = U256::decode(buf)?;
    Ok(Signature::new(r, s, parity))
}
