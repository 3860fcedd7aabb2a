use crate::{
    transaction::{decode_signature_typed, encode_signature_fields, signature_fields_len},
    SignableTransaction, Signed, Transaction, TxError, Typed2718,
};
use alloy_eip2930::AccessList;
use alloy_eip7702::SignedAuthorization;
use alloy_primitives::{keccak256, Address, Bytes, ChainId, Signature, TxKind, B256, U256};
use alloy_rlp::{length_of_length, BufMut, Decodable, Encodable, Header};

/// A set-code transaction ([EIP-7702](https://eips.ethereum.org/EIPS/eip-7702)),
/// delegating code to the sender account via signed authorizations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TxEip7702 {
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
    /// The 160-bit address of the message call's recipient. Set-code
    /// transactions cannot create contracts.
    pub to: Address,
    /// A scalar value equal to the number of Wei to be transferred to the
    /// message call's recipient.
    pub value: U256,
    /// The addresses and storage keys the transaction plans to access.
    pub access_list: AccessList,
    /// The code delegations installed before execution.
    pub authorization_list: Vec<SignedAuthorization>,
    /// The calldata of the call.
    pub input: Bytes,
}

impl TxEip7702 {
    /// The EIP-2718 transaction type.
    pub const TX_TYPE: u8 = 4;

    /// Checks the set-code specific validity rules.
    pub fn validate(&self) -> Result<(), TxError> {
        if self.authorization_list.is_empty() {
            return Err(TxError::EmptyAuthorizationList);
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
        len += self.authorization_list.length();
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
        self.authorization_list.encode(out);
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
            authorization_list: Decodable::decode(buf)?,
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
}

impl Typed2718 for TxEip7702 {
    fn ty(&self) -> u8 {
        Self::TX_TYPE
    }
}

impl Transaction for TxEip7702 {
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
        None
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
        None
    }

    fn authorization_list(&self) -> Option<&[SignedAuthorization]> {
        Some(&self.authorization_list)
    }
}

impl SignableTransaction for TxEip7702 {
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

impl Encodable for TxEip7702 {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        length_of_length(payload_length) + payload_length
    }
}

impl Decodable for TxEip7702 {
    fn decode(data: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(data)?;
        if header.payload_length > data.len() {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        Self::decode_inner(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use alloy_eip7702::Authorization;
    use alloy_primitives::address;
    use assert_matches::assert_matches;

    fn test_authorization() -> SignedAuthorization {
        let auth = Authorization {
            chain_id: U256::from(1u64),
            address: address!("2222222222222222222222222222222222222222"),
            nonce: 1,
        };
        auth.into_signed(Signature::new(U256::from(1u64), U256::from(2u64), false))
    }

    #[test]
    fn empty_authorization_list_rejected() {
        let tx = TxEip7702::default();
        assert_matches!(tx.validate(), Err(TxError::EmptyAuthorizationList));
    }

    #[test]
    fn signed_roundtrip() {
        let secret = B256::repeat_byte(0x66);
        let tx = TxEip7702 {
            chain_id: 1,
            nonce: 5,
            gas_limit: 100_000,
            max_fee_per_gas: 50,
            max_priority_fee_per_gas: 5,
            to: address!("3333333333333333333333333333333333333333"),
            value: U256::from(123u64),
            access_list: AccessList::default(),
            authorization_list: vec![test_authorization()],
            input: Bytes::new(),
        };
        tx.validate().unwrap();

        let signature = crypto::sign_message(secret, tx.signature_hash()).unwrap();
        let signed = tx.clone().into_signed(signature);

        let mut buf = Vec::new();
        signed.tx().encode_with_signature(signed.signature(), &mut buf);
        let decoded = TxEip7702::decode_signed_fields(&mut buf.as_slice()).unwrap();

        assert_eq!(decoded.tx(), &tx);
        assert_eq!(decoded.hash(), signed.hash());
    }
}
