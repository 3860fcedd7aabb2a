//! The transaction-pool wire representation.

use crate::{
    eip2718::{Decodable2718, Encodable2718, Typed2718},
    Signed, TxEip1559, TxEip2930, TxEip4844WithSidecar, TxEip7702, TxEnvelope, TxLegacy, TxType,
};
use alloy_primitives::B256;
use alloy_rlp::{BufMut, Decodable, Encodable};

/// A transaction as exchanged between transaction pools.
///
/// Identical to [`TxEnvelope`] except that blob transactions must travel in
/// the pooled form, sidecar included.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PooledTransaction {
    /// An untagged legacy transaction.
    Legacy(Signed<TxLegacy>),
    /// A [`TxEip2930`] tagged with type 1.
    Eip2930(Signed<TxEip2930>),
    /// A [`TxEip1559`] tagged with type 2.
    Eip1559(Signed<TxEip1559>),
    /// A blob transaction with its sidecar, tagged with type 3.
    Eip4844(Signed<TxEip4844WithSidecar>),
    /// A [`TxEip7702`] tagged with type 4.
    Eip7702(Signed<TxEip7702>),
}

impl PooledTransaction {
    /// Return the hash of the inner transaction.
    pub const fn tx_hash(&self) -> &B256 {
        match self {
            Self::Legacy(tx) => tx.hash(),
            Self::Eip2930(tx) => tx.hash(),
            Self::Eip1559(tx) => tx.hash(),
            Self::Eip4844(tx) => tx.hash(),
            Self::Eip7702(tx) => tx.hash(),
        }
    }

    /// Converts into the canonical envelope, dropping any sidecar.
    pub fn into_envelope(self) -> TxEnvelope {
        match self {
            Self::Legacy(tx) => TxEnvelope::Legacy(tx),
            Self::Eip2930(tx) => TxEnvelope::Eip2930(tx),
            Self::Eip1559(tx) => TxEnvelope::Eip1559(tx),
            Self::Eip4844(tx) => {
                let (tx, signature, hash) = tx.into_parts();
                TxEnvelope::Eip4844(Signed::new_unchecked(
                    crate::TxEip4844Variant::TxEip4844WithSidecar(tx),
                    signature,
                    hash,
                ))
            }
            Self::Eip7702(tx) => TxEnvelope::Eip7702(tx),
        }
    }
}

impl Typed2718 for PooledTransaction {
    fn ty(&self) -> u8 {
        match self {
            Self::Legacy(_) => TxType::Legacy as u8,
            Self::Eip2930(_) => TxType::Eip2930 as u8,
            Self::Eip1559(_) => TxType::Eip1559 as u8,
            Self::Eip4844(_) => TxType::Eip4844 as u8,
            Self::Eip7702(_) => TxType::Eip7702 as u8,
        }
    }
}

impl Encodable2718 for PooledTransaction {
    fn encode_2718_len(&self) -> usize {
        match self {
            Self::Legacy(tx) => tx.tx().encoded_len_with_signature(tx.signature()),
            Self::Eip2930(tx) => 1 + tx.tx().encoded_len_with_signature(tx.signature()),
            Self::Eip1559(tx) => 1 + tx.tx().encoded_len_with_signature(tx.signature()),
            Self::Eip4844(tx) => 1 + tx.tx().encoded_len_with_signature(tx.signature()),
            Self::Eip7702(tx) => 1 + tx.tx().encoded_len_with_signature(tx.signature()),
        }
    }

    fn encode_2718(&self, out: &mut dyn BufMut) {
        match self {
            Self::Legacy(tx) => tx.tx().encode_with_signature_fields(tx.signature(), out),
            Self::Eip2930(tx) => {
                out.put_u8(TxType::Eip2930 as u8);
                tx.tx().encode_with_signature(tx.signature(), out);
            }
            Self::Eip1559(tx) => {
                out.put_u8(TxType::Eip1559 as u8);
                tx.tx().encode_with_signature(tx.signature(), out);
            }
            Self::Eip4844(tx) => {
                out.put_u8(TxType::Eip4844 as u8);
                tx.tx().encode_with_signature(tx.signature(), out);
            }
            Self::Eip7702(tx) => {
                out.put_u8(TxType::Eip7702 as u8);
                tx.tx().encode_with_signature(tx.signature(), out);
            }
        }
    }
}

impl Decodable2718 for PooledTransaction {
    fn typed_decode(ty: u8, buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        match TxType::try_from(ty)
            .map_err(|_| alloy_rlp::Error::Custom("unexpected tx type"))?
        {
            TxType::Eip2930 => Ok(Self::Eip2930(TxEip2930::decode_signed_fields(buf)?)),
            TxType::Eip1559 => Ok(Self::Eip1559(TxEip1559::decode_signed_fields(buf)?)),
            // pooled blob transactions always carry the sidecar
            TxType::Eip4844 => {
                Ok(Self::Eip4844(TxEip4844WithSidecar::decode_signed_fields(buf)?))
            }
            TxType::Eip7702 => Ok(Self::Eip7702(TxEip7702::decode_signed_fields(buf)?)),
            TxType::Legacy => {
                Err(alloy_rlp::Error::Custom("type-0 eip2718 transactions are not supported"))
            }
        }
    }

    fn fallback_decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self::Legacy(TxLegacy::decode_signed_fields(buf)?))
    }
}

impl Encodable for PooledTransaction {
    fn encode(&self, out: &mut dyn BufMut) {
        self.network_encode(out)
    }

    fn length(&self) -> usize {
        self.network_len()
    }
}

impl Decodable for PooledTransaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Self::network_decode(buf)
    }
}

impl TryFrom<TxEnvelope> for PooledTransaction {
    type Error = crate::TxError;

    /// Fails for a bare blob transaction, which has no sidecar to broadcast.
    fn try_from(envelope: TxEnvelope) -> Result<Self, Self::Error> {
        match envelope {
            TxEnvelope::Legacy(tx) => Ok(Self::Legacy(tx)),
            TxEnvelope::Eip2930(tx) => Ok(Self::Eip2930(tx)),
            TxEnvelope::Eip1559(tx) => Ok(Self::Eip1559(tx)),
            TxEnvelope::Eip4844(tx) => {
                let (variant, signature, hash) = tx.into_parts();
                match variant {
                    crate::TxEip4844Variant::TxEip4844WithSidecar(tx) => {
                        Ok(Self::Eip4844(Signed::new_unchecked(tx, signature, hash)))
                    }
                    crate::TxEip4844Variant::TxEip4844(_) => Err(crate::TxError::MissingSidecar),
                }
            }
            TxEnvelope::Eip7702(tx) => Ok(Self::Eip7702(tx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Blob, BlobTransactionSidecar, Bytes48, SignableTransaction, TxEip4844, TxSidecar,
    };
    use alloy_eip2930::AccessList;
    use alloy_primitives::{Address, Bytes, Signature, TxKind, U256};

    fn test_signature() -> Signature {
        Signature::new(U256::from(1u64), U256::from(2u64), false)
    }

    #[test]
    fn blob_tx_decodes_with_sidecar() {
        let tx = TxEip4844 {
            chain_id: 1,
            nonce: 0,
            gas_limit: 21_000,
            max_fee_per_gas: 10,
            max_priority_fee_per_gas: 1,
            to: Address::left_padding_from(&[1]),
            value: U256::ZERO,
            access_list: AccessList::default(),
            blob_versioned_hashes: vec![{
                let mut h = alloy_primitives::B256::ZERO;
                h.0[0] = 0x01;
                h
            }],
            max_fee_per_blob_gas: 2,
            input: Bytes::new(),
        };
        let pooled = tx.with_sidecar(TxSidecar::Eip4844(BlobTransactionSidecar {
            blobs: vec![Blob::repeat_byte(1)],
            commitments: vec![Bytes48::repeat_byte(2)],
            proofs: vec![Bytes48::repeat_byte(3)],
        }));
        let signed = PooledTransaction::Eip4844(pooled.into_signed(test_signature()));

        let encoded = signed.encoded_2718();
        let decoded = PooledTransaction::decode_2718(&mut encoded.as_ref()).unwrap();
        assert_eq!(decoded, signed);
    }

    #[test]
    fn bare_blob_envelope_rejected() {
        let tx = TxEip4844 { chain_id: 1, ..Default::default() };
        let envelope: TxEnvelope = tx.into_signed(test_signature()).into();
        assert!(PooledTransaction::try_from(envelope).is_err());
    }

    #[test]
    fn legacy_roundtrip_via_network_format() {
        let tx = TxLegacy {
            chain_id: None,
            nonce: 1,
            gas_price: 5,
            gas_limit: 21_000,
            to: TxKind::Create,
            value: U256::ZERO,
            input: Bytes::from(vec![1, 2, 3]),
        };
        let pooled = PooledTransaction::Legacy(tx.into_signed(test_signature()));
        let encoded = alloy_rlp::encode(&pooled);
        let decoded = PooledTransaction::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, pooled);
    }
}
