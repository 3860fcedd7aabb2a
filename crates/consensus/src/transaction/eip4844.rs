use crate::{
    constants::{MAX_BLOBS_PER_TX, VERSIONED_HASH_VERSION_KZG},
    transaction::{decode_signature_typed, encode_signature_fields, signature_fields_len},
    SignableTransaction, Signed, Transaction, TxError, TxSidecar, Typed2718,
};
use alloy_eip2930::AccessList;
use alloy_eip7702::SignedAuthorization;
use alloy_primitives::{keccak256, Address, Bytes, ChainId, Signature, TxKind, B256, U256};
use alloy_rlp::{length_of_length, BufMut, Decodable, Encodable, Header};

/// A blob transaction ([EIP-4844](https://eips.ethereum.org/EIPS/eip-4844)).
///
/// This is the canonical form, committed to in blocks and exchanged in block
/// bodies. On the transaction-pool wire the transaction travels together with
/// its sidecar as [`TxEip4844WithSidecar`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TxEip4844 {
    /// EIP-155: Simple replay attack protection.
    pub chain_id: ChainId,
    /// A scalar value equal to the number of transactions sent by the sender.
    pub nonce: u64,
    /// A scalar value equal to the maximum amount of gas that should be used
    /// in executing this transaction.
    pub gas_limit: u64,
    /// Maximum fee per unit of gas, also known as `GasFeeCap`.
    pub max_fee_per_gas: u128,
    /// Maximum priority fee per unit of gas, also known as `GasTipCap`.
    pub max_priority_fee_per_gas: u128,
    /// The 160-bit address of the message call's recipient. Blob transactions
    /// cannot create contracts.
    pub to: Address,
    /// A scalar value equal to the number of Wei to be transferred to the
    /// message call's recipient.
    pub value: U256,
    /// The addresses and storage keys the transaction plans to access.
    pub access_list: AccessList,
    /// Commitment hashes of the blobs this transaction carries, each tagged
    /// with the KZG version byte.
    pub blob_versioned_hashes: Vec<B256>,
    /// Maximum fee per unit of blob gas.
    pub max_fee_per_blob_gas: u128,
    /// The calldata of the call.
    pub input: Bytes,
}

impl TxEip4844 {
    /// The EIP-2718 transaction type.
    pub const TX_TYPE: u8 = 3;

    /// Verifies the blob commitments of the transaction itself: at least one
    /// versioned hash, every hash tagged with the KZG version byte, and no
    /// more hashes than the per-transaction maximum.
    pub fn validate(&self) -> Result<(), TxError> {
        if self.blob_versioned_hashes.is_empty() {
            return Err(TxError::EmptyVersionedHashes);
        }
        if self.blob_versioned_hashes.len() > MAX_BLOBS_PER_TX {
            return Err(TxError::TooManyBlobs {
                have: self.blob_versioned_hashes.len(),
                max: MAX_BLOBS_PER_TX,
            });
        }
        for hash in &self.blob_versioned_hashes {
            if hash[0] != VERSIONED_HASH_VERSION_KZG {
                return Err(TxError::InvalidVersionedHash(hash[0]));
            }
        }
        Ok(())
    }

    pub(crate) fn fields_len(&self) -> usize {
        let mut len = 0;
        len += self.chain_id.length();
        len += self.nonce.length();
        len += self.max_priority_fee_per_gas.length();
        len += self.max_fee_per_gas.length();
        len += self.gas_limit.length();
        len += self.to.length();
        len += self.value.length();
        len += self.input.0.length();
        len += self.access_list.length();
        len += self.max_fee_per_blob_gas.length();
        len += self.blob_versioned_hashes.length();
        len
    }

    pub(crate) fn encode_fields(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.0.encode(out);
        self.access_list.encode(out);
        self.max_fee_per_blob_gas.encode(out);
        self.blob_versioned_hashes.encode(out);
    }

    pub(crate) fn decode_inner(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self {
            chain_id: Decodable::decode(buf)?,
            nonce: Decodable::decode(buf)?,
            max_priority_fee_per_gas: Decodable::decode(buf)?,
            max_fee_per_gas: Decodable::decode(buf)?,
            gas_limit: Decodable::decode(buf)?,
            to: Decodable::decode(buf)?,
            value: Decodable::decode(buf)?,
            input: Decodable::decode(buf)?,
            access_list: Decodable::decode(buf)?,
            max_fee_per_blob_gas: Decodable::decode(buf)?,
            blob_versioned_hashes: Decodable::decode(buf)?,
        })
    }

    /// Encodes the signed transaction as a list of `fields ∥ parity ∥ r ∥ s`,
    /// without the type byte.
    pub(crate) fn encode_with_signature(&self, signature: &Signature, out: &mut dyn BufMut) {
        let payload_length = self.fields_len() + signature_fields_len(signature, signature.v());
        Header { list: true, payload_length }.encode(out);
        self.encode_fields(out);
        encode_signature_fields(signature, signature.v(), out);
    }

    /// Length of the signed encoding, without the type byte.
    pub(crate) fn encoded_len_with_signature(&self, signature: &Signature) -> usize {
        let payload_length = self.fields_len() + signature_fields_len(signature, signature.v());
        Header { list: true, payload_length }.length() + payload_length
    }

    /// Decodes the signed transaction body following the type byte.
    pub fn decode_signed_fields(buf: &mut &[u8]) -> alloy_rlp::Result<Signed<Self>> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let original_len = buf.len();

        let tx = Self::decode_inner(buf)?;
        let signature = decode_signature_typed(buf)?;

        if original_len - buf.len() != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: original_len - buf.len(),
            });
        }

        Ok(tx.into_signed(signature))
    }

    /// Attaches a sidecar, producing the pooled form.
    pub fn with_sidecar(self, sidecar: TxSidecar) -> TxEip4844WithSidecar {
        TxEip4844WithSidecar { tx: self, sidecar }
    }
}

impl Typed2718 for TxEip4844 {
    fn ty(&self) -> u8 {
        Self::TX_TYPE
    }
}

impl Transaction for TxEip4844 {
    fn chain_id(&self) -> Option<ChainId> {
        Some(self.chain_id)
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    fn gas_price(&self) -> Option<u128> {
        None
    }

    fn max_fee_per_gas(&self) -> u128 {
        self.max_fee_per_gas
    }

    fn max_priority_fee_per_gas(&self) -> Option<u128> {
        Some(self.max_priority_fee_per_gas)
    }

    fn max_fee_per_blob_gas(&self) -> Option<u128> {
        Some(self.max_fee_per_blob_gas)
    }

    fn effective_gas_price(&self, base_fee: Option<u64>) -> u128 {
        match base_fee {
            None => self.max_fee_per_gas,
            Some(base_fee) => {
                let tip = self.max_fee_per_gas.saturating_sub(base_fee as u128);
                if tip > self.max_priority_fee_per_gas {
                    self.max_priority_fee_per_gas + base_fee as u128
                } else {
                    self.max_fee_per_gas
                }
            }
        }
    }

    fn is_dynamic_fee(&self) -> bool {
        true
    }

    fn kind(&self) -> TxKind {
        TxKind::Call(self.to)
    }

    fn is_create(&self) -> bool {
        false
    }

    fn value(&self) -> U256 {
        self.value
    }

    fn input(&self) -> &Bytes {
        &self.input
    }

    fn access_list(&self) -> Option<&AccessList> {
        Some(&self.access_list)
    }

    fn blob_versioned_hashes(&self) -> Option<&[B256]> {
        Some(&self.blob_versioned_hashes)
    }

    fn authorization_list(&self) -> Option<&[SignedAuthorization]> {
        None
    }
}

impl SignableTransaction for TxEip4844 {
    fn set_chain_id(&mut self, chain_id: ChainId) {
        self.chain_id = chain_id;
    }

    fn encode_for_signing(&self, out: &mut dyn BufMut) {
        out.put_u8(Self::TX_TYPE);
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.encode_fields(out);
    }

    fn payload_len_for_signature(&self) -> usize {
        let payload_length = self.fields_len();
        1 + length_of_length(payload_length) + payload_length
    }

    fn into_signed(self, signature: Signature) -> Signed<Self> {
        let mut buf = Vec::with_capacity(1 + self.encoded_len_with_signature(&signature));
        buf.put_u8(Self::TX_TYPE);
        self.encode_with_signature(&signature, &mut buf);
        let hash = keccak256(&buf);
        Signed::new_unchecked(self, signature, hash)
    }
}

impl Encodable for TxEip4844 {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        length_of_length(payload_length) + payload_length
    }
}

impl Decodable for TxEip4844 {
    fn decode(data: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(data)?;
        if header.payload_length > data.len() {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        Self::decode_inner(data)
    }
}

/// An [EIP-4844](https://eips.ethereum.org/EIPS/eip-4844) transaction bundled
/// with its blob sidecar, the form broadcast between transaction pools.
///
/// The transaction hash and the signing hash cover only the inner
/// transaction, never the sidecar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxEip4844WithSidecar {
    /// The canonical transaction.
    pub tx: TxEip4844,
    /// The blob payload, in either wrapper version.
    pub sidecar: TxSidecar,
}

impl TxEip4844WithSidecar {
    /// Returns the inner transaction.
    pub const fn tx(&self) -> &TxEip4844 {
        &self.tx
    }

    /// Validates the transaction commitments and the sidecar shape, and that
    /// the sidecar carries exactly one blob per versioned hash.
    pub fn validate(&self) -> Result<(), TxError> {
        self.tx.validate()?;
        self.sidecar.validate()?;
        if self.sidecar.blob_count() != self.tx.blob_versioned_hashes.len() {
            return Err(TxError::SidecarLengthMismatch);
        }
        Ok(())
    }

    /// Encodes the signed pooled form, without the type byte:
    /// `rlp([[fields, sig], {version,} blobs, commitments, proofs])`.
    pub(crate) fn encode_with_signature(&self, signature: &Signature, out: &mut dyn BufMut) {
        let payload_length =
            self.tx.encoded_len_with_signature(signature) + self.sidecar.fields_len();
        Header { list: true, payload_length }.encode(out);
        self.tx.encode_with_signature(signature, out);
        self.sidecar.encode_fields(out);
    }

    /// Length of the signed pooled encoding, without the type byte.
    pub(crate) fn encoded_len_with_signature(&self, signature: &Signature) -> usize {
        let payload_length =
            self.tx.encoded_len_with_signature(signature) + self.sidecar.fields_len();
        Header { list: true, payload_length }.length() + payload_length
    }

    /// Decodes the signed pooled body following the type byte.
    pub fn decode_signed_fields(buf: &mut &[u8]) -> alloy_rlp::Result<Signed<Self>> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let original_len = buf.len();

        let inner = TxEip4844::decode_signed_fields(buf)?;
        let sidecar = TxSidecar::decode_fields(buf)
            .map_err(|_| alloy_rlp::Error::Custom("invalid blob sidecar"))?;

        if original_len - buf.len() != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: original_len - buf.len(),
            });
        }

        let (tx, signature, hash) = inner.into_parts();
        Ok(Signed::new_unchecked(Self { tx, sidecar }, signature, hash))
    }
}

impl Typed2718 for TxEip4844WithSidecar {
    fn ty(&self) -> u8 {
        TxEip4844::TX_TYPE
    }
}

impl Transaction for TxEip4844WithSidecar {
    fn chain_id(&self) -> Option<ChainId> {
        self.tx.chain_id()
    }

    fn nonce(&self) -> u64 {
        self.tx.nonce()
    }

    fn gas_limit(&self) -> u64 {
        self.tx.gas_limit()
    }

    fn gas_price(&self) -> Option<u128> {
        None
    }

    fn max_fee_per_gas(&self) -> u128 {
        self.tx.max_fee_per_gas()
    }

    fn max_priority_fee_per_gas(&self) -> Option<u128> {
        self.tx.max_priority_fee_per_gas()
    }

    fn max_fee_per_blob_gas(&self) -> Option<u128> {
        self.tx.max_fee_per_blob_gas()
    }

    fn effective_gas_price(&self, base_fee: Option<u64>) -> u128 {
        self.tx.effective_gas_price(base_fee)
    }

    fn is_dynamic_fee(&self) -> bool {
        true
    }

    fn kind(&self) -> TxKind {
        self.tx.kind()
    }

    fn is_create(&self) -> bool {
        false
    }

    fn value(&self) -> U256 {
        self.tx.value()
    }

    fn input(&self) -> &Bytes {
        self.tx.input()
    }

    fn access_list(&self) -> Option<&AccessList> {
        self.tx.access_list()
    }

    fn blob_versioned_hashes(&self) -> Option<&[B256]> {
        self.tx.blob_versioned_hashes()
    }

    fn authorization_list(&self) -> Option<&[SignedAuthorization]> {
        None
    }
}

impl SignableTransaction for TxEip4844WithSidecar {
    fn set_chain_id(&mut self, chain_id: ChainId) {
        self.tx.set_chain_id(chain_id);
    }

    fn encode_for_signing(&self, out: &mut dyn BufMut) {
        // the signing hash never covers the sidecar
        self.tx.encode_for_signing(out);
    }

    fn payload_len_for_signature(&self) -> usize {
        self.tx.payload_len_for_signature()
    }

    fn into_signed(self, signature: Signature) -> Signed<Self> {
        let inner = self.tx.clone().into_signed(signature);
        let (_, signature, hash) = inner.into_parts();
        Signed::new_unchecked(self, signature, hash)
    }
}

/// A blob transaction in either representation: bare (as stored in blocks)
/// or with its sidecar (as broadcast between pools).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum TxEip4844Variant {
    /// The canonical transaction without blob data.
    TxEip4844(TxEip4844),
    /// The pooled transaction with blob data.
    TxEip4844WithSidecar(TxEip4844WithSidecar),
}

impl TxEip4844Variant {
    /// The canonical transaction, regardless of representation.
    pub const fn tx(&self) -> &TxEip4844 {
        match self {
            Self::TxEip4844(tx) => tx,
            Self::TxEip4844WithSidecar(tx) => tx.tx(),
        }
    }

    /// The sidecar, if this is the pooled representation.
    pub const fn sidecar(&self) -> Option<&TxSidecar> {
        match self {
            Self::TxEip4844(_) => None,
            Self::TxEip4844WithSidecar(tx) => Some(&tx.sidecar),
        }
    }
}

impl From<TxEip4844> for TxEip4844Variant {
    fn from(tx: TxEip4844) -> Self {
        Self::TxEip4844(tx)
    }
}

impl From<TxEip4844WithSidecar> for TxEip4844Variant {
    fn from(tx: TxEip4844WithSidecar) -> Self {
        Self::TxEip4844WithSidecar(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto,
        transaction::sidecar::{Blob, BlobTransactionSidecar, Bytes48},
    };
    use alloy_primitives::address;
    use assert_matches::assert_matches;

    fn base_tx(hashes: usize) -> TxEip4844 {
        TxEip4844 {
            chain_id: 1,
            nonce: 7,
            gas_limit: 21_000,
            max_fee_per_gas: 100,
            max_priority_fee_per_gas: 10,
            to: address!("1111111111111111111111111111111111111111"),
            value: U256::ZERO,
            access_list: AccessList::default(),
            blob_versioned_hashes: (0..hashes)
                .map(|i| {
                    let mut hash = B256::repeat_byte(i as u8);
                    hash.0[0] = VERSIONED_HASH_VERSION_KZG;
                    hash
                })
                .collect(),
            max_fee_per_blob_gas: 1,
            input: Bytes::new(),
        }
    }

    #[test]
    fn validate_versioned_hashes() {
        assert_matches!(base_tx(0).validate(), Err(TxError::EmptyVersionedHashes));
        assert_matches!(
            base_tx(7).validate(),
            Err(TxError::TooManyBlobs { have: 7, max: MAX_BLOBS_PER_TX })
        );
        base_tx(6).validate().unwrap();

        let mut tx = base_tx(1);
        tx.blob_versioned_hashes[0].0[0] = 0x02;
        assert_matches!(tx.validate(), Err(TxError::InvalidVersionedHash(0x02)));
    }

    #[test]
    fn signed_roundtrip() {
        let secret = B256::repeat_byte(0x44);
        let tx = base_tx(2);

        let signature = crypto::sign_message(secret, tx.signature_hash()).unwrap();
        let signed = tx.clone().into_signed(signature);

        let mut buf = Vec::new();
        signed.tx().encode_with_signature(signed.signature(), &mut buf);
        let decoded = TxEip4844::decode_signed_fields(&mut buf.as_slice()).unwrap();

        assert_eq!(decoded.tx(), &tx);
        assert_eq!(decoded.hash(), signed.hash());
    }

    #[test]
    fn pooled_roundtrip_keeps_tx_hash() {
        let secret = B256::repeat_byte(0x55);
        let tx = base_tx(1);
        let sidecar = TxSidecar::Eip4844(BlobTransactionSidecar {
            blobs: vec![Blob::repeat_byte(9)],
            commitments: vec![Bytes48::repeat_byte(8)],
            proofs: vec![Bytes48::repeat_byte(7)],
        });

        let signature = crypto::sign_message(secret, tx.signature_hash()).unwrap();
        let bare = tx.clone().into_signed(signature);
        let pooled = tx.with_sidecar(sidecar).into_signed(signature);
        pooled.tx().validate().unwrap();

        // sidecar does not change the transaction hash
        assert_eq!(bare.hash(), pooled.hash());

        let mut buf = Vec::new();
        pooled.tx().encode_with_signature(pooled.signature(), &mut buf);
        let decoded = TxEip4844WithSidecar::decode_signed_fields(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.tx(), pooled.tx());
        assert_eq!(decoded.hash(), pooled.hash());
    }
}
