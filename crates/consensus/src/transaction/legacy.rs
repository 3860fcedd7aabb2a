use crate::{
    transaction::{encode_signature_fields, signature_fields_len},
    SignableTransaction, Signed, Transaction, Typed2718,
};
use alloy_eip2930::AccessList;
use alloy_eip7702::SignedAuthorization;
use alloy_primitives::{
    keccak256, Bytes, ChainId, Signature, TxKind, B256, U256,
};
use alloy_rlp::{length_of_length, BufMut, Decodable, Encodable, Header, Result};

/// Legacy transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TxLegacy {
    /// Added as EIP-155: Simple replay attack protection.
    ///
    /// `None` for pre-EIP-155 transactions; derived from `v` when decoding a
    /// signed transaction with `v >= 37`.
    pub chain_id: Option<ChainId>,
    /// A scalar value equal to the number of transactions sent by the sender.
    pub nonce: u64,
    /// A scalar value equal to the number of Wei to be paid per unit of gas.
    pub gas_price: u128,
    /// A scalar value equal to the maximum amount of gas that should be used
    /// in executing this transaction.
    pub gas_limit: u64,
    /// The 160-bit address of the message call's recipient, or create.
    pub to: TxKind,
    /// A scalar value equal to the number of Wei to be transferred to the
    /// message call's recipient, or endowment for a creation.
    pub value: U256,
    /// The calldata of the call, or the EVM initialisation code for a
    /// creation.
    pub input: Bytes,
}

impl TxLegacy {
    /// The EIP-2718 transaction type.
    pub const TX_TYPE: u8 = 0;

    /// Outputs the length of the transaction's fields, without a RLP header
    /// or the eip155 fields.
    pub(crate) fn fields_len(&self) -> usize {
        let mut len = 0;
        len += self.nonce.length();
        len += self.gas_price.length();
        len += self.gas_limit.length();
        len += self.to.length();
        len += self.value.length();
        len += self.input.0.length();
        len
    }

    /// Encodes only the transaction's fields into the desired buffer, without
    /// a RLP header or eip155 fields.
    pub(crate) fn encode_fields(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.0.encode(out);
    }

    /// Encodes EIP-155 signing arguments into the desired buffer.
    ///
    /// A transaction without a chain ID is pre-EIP-155 and signs over the
    /// bare fields.
    pub(crate) fn encode_eip155_signing_fields(&self, out: &mut dyn BufMut) {
        if let Some(id) = self.chain_id {
            // EIP-155 appends the chain ID and two zeroes
            id.encode(out);
            0x00u8.encode(out);
            0x00u8.encode(out);
        }
    }

    /// Outputs the length of the EIP-155 signing fields, zero for pre-EIP-155
    /// transactions.
    pub(crate) fn eip155_fields_len(&self) -> usize {
        self.chain_id.map_or(0, |id| id.length() + 2)
    }

    /// Encodes the transaction with the signature, as a list of
    /// `fields ∥ v ∥ r ∥ s` where v carries the EIP-155 chain id if present.
    pub(crate) fn encode_with_signature_fields(
        &self,
        signature: &Signature,
        out: &mut dyn BufMut,
    ) {
        let v = to_eip155_value(signature.v(), self.chain_id);
        let payload_length = self.fields_len() + signature_fields_len(signature, v);
        Header { list: true, payload_length }.encode(out);
        self.encode_fields(out);
        encode_signature_fields(signature, v, out);
    }

    /// Returns the encoded length of the transaction with the given
    /// signature.
    pub(crate) fn encoded_len_with_signature(&self, signature: &Signature) -> usize {
        let v = to_eip155_value(signature.v(), self.chain_id);
        let payload_length = self.fields_len() + signature_fields_len(signature, v);
        Header { list: true, payload_length }.length() + payload_length
    }

    /// Decodes the transaction from RLP bytes, including the signature.
    ///
    /// Expects a list header followed by the fields and `v ∥ r ∥ s`; the
    /// chain id is extracted from v.
    pub fn decode_signed_fields(buf: &mut &[u8]) -> Result<Signed<Self>> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }

        // record original length so we can check the encoding consumed exactly
        // the advertised payload
        let original_len = buf.len();

        let mut tx = Self::decode_fields(buf)?;

        let v = u64::decode(buf)?;
        let r = U256::decode(buf)?;
        let s = U256::decode(buf)?;
        let (parity, chain_id) =
            from_eip155_value(v).ok_or(alloy_rlp::Error::Custom("invalid EIP-155 v value"))?;
        tx.chain_id = chain_id;
        let signature = Signature::new(r, s, parity);

        if original_len - buf.len() != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: original_len - buf.len(),
            });
        }

        Ok(tx.into_signed(signature))
    }

    /// Decode the RLP fields of the transaction, without decoding an RLP
    /// header.
    pub(crate) fn decode_fields(data: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            nonce: Decodable::decode(data)?,
            gas_price: Decodable::decode(data)?,
            gas_limit: Decodable::decode(data)?,
            to: Decodable::decode(data)?,
            value: Decodable::decode(data)?,
            input: Decodable::decode(data)?,
            chain_id: None,
        })
    }
}

impl Typed2718 for TxLegacy {
    fn ty(&self) -> u8 {
        Self::TX_TYPE
    }
}

impl Transaction for TxLegacy {
    fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    fn gas_price(&self) -> Option<u128> {
        Some(self.gas_price)
    }

    fn max_fee_per_gas(&self) -> u128 {
        self.gas_price
    }

    fn max_priority_fee_per_gas(&self) -> Option<u128> {
        None
    }

    fn max_fee_per_blob_gas(&self) -> Option<u128> {
        None
    }

    fn effective_gas_price(&self, _base_fee: Option<u64>) -> u128 {
        self.gas_price
    }

    fn is_dynamic_fee(&self) -> bool {
        false
    }

    fn kind(&self) -> TxKind {
        self.to
    }

    fn value(&self) -> U256 {
        self.value
    }

    fn input(&self) -> &Bytes {
        &self.input
    }

    fn access_list(&self) -> Option<&AccessList> {
        None
    }

    fn blob_versioned_hashes(&self) -> Option<&[B256]> {
        None
    }

    fn authorization_list(&self) -> Option<&[SignedAuthorization]> {
        None
    }
}

impl SignableTransaction for TxLegacy {
    fn set_chain_id(&mut self, chain_id: ChainId) {
        self.chain_id = Some(chain_id);
    }

    fn encode_for_signing(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() + self.eip155_fields_len() }
            .encode(out);
        self.encode_fields(out);
        self.encode_eip155_signing_fields(out);
    }

    fn payload_len_for_signature(&self) -> usize {
        let payload_length = self.fields_len() + self.eip155_fields_len();
        Header { list: true, payload_length }.length() + payload_length
    }

    fn into_signed(self, signature: Signature) -> Signed<Self> {
        let mut buf = Vec::with_capacity(self.encoded_len_with_signature(&signature));
        self.encode_with_signature_fields(&signature, &mut buf);
        let hash = keccak256(&buf);
        Signed::new_unchecked(self, signature, hash)
    }
}

impl Encodable for TxLegacy {
    fn encode(&self, out: &mut dyn BufMut) {
        self.encode_for_signing(out)
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len() + self.eip155_fields_len();
        length_of_length(payload_length) + payload_length
    }
}

impl Decodable for TxLegacy {
    fn decode(data: &mut &[u8]) -> Result<Self> {
        let header = Header::decode(data)?;
        let remaining_len = data.len();

        if header.payload_length > remaining_len {
            return Err(alloy_rlp::Error::InputTooShort);
        }

        let mut transaction = Self::decode_fields(data)?;

        // If we still have data, it should be the eip155 signing fields
        if remaining_len - data.len() < header.payload_length {
            transaction.chain_id = Some(Decodable::decode(data)?);
            let _: U256 = Decodable::decode(data)?;
            let _: U256 = Decodable::decode(data)?;
        }

        if remaining_len - data.len() != header.payload_length {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }

        Ok(transaction)
    }
}

/// Builds the legacy `v` value from the signature parity and an optional
/// chain id: `27 + parity` unprotected, `35 + 2·chain_id + parity` under
/// [EIP-155](https://eips.ethereum.org/EIPS/eip-155).
pub const fn to_eip155_value(y_parity: bool, chain_id: Option<ChainId>) -> u64 {
    match chain_id {
        Some(id) => 35 + id * 2 + y_parity as u64,
        None => 27 + y_parity as u64,
    }
}

/// Splits a legacy `v` value into the signature parity and the chain id it
/// protects, if any. Returns `None` for values that encode neither form.
pub const fn from_eip155_value(value: u64) -> Option<(bool, Option<ChainId>)> {
    match value {
        27 => Some((false, None)),
        28 => Some((true, None)),
        _ => {
            if value >= 35 {
                Some(((value - 35) % 2 != 0, Some((value - 35) / 2)))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use alloy_primitives::{address, b256, hex, Address, B256};

    #[test]
    fn eip155_value_roundtrip() {
        // unprotected
        assert_eq!(from_eip155_value(27), Some((false, None)));
        assert_eq!(from_eip155_value(28), Some((true, None)));
        assert_eq!(from_eip155_value(29), None);
        assert_eq!(from_eip155_value(34), None);
        // protected, chain id derived from v
        assert_eq!(from_eip155_value(37), Some((false, Some(1))));
        assert_eq!(from_eip155_value(38), Some((true, Some(1))));
        for chain_id in [1u64, 5, 1337, 11155111] {
            for parity in [false, true] {
                let v = to_eip155_value(parity, Some(chain_id));
                assert!(v >= 37);
                assert_eq!(from_eip155_value(v), Some((parity, Some(chain_id))));
            }
        }
    }

    #[test]
    fn recover_signer_legacy() {
        let signer: Address = address!("398137383b3d25c92898c656696e41950e47316b");
        let hash: B256 =
            b256!("bb3a336e3f823ec18197f1e13ee875700f08f03e2cab75f0d0b118dabb44cba0");

        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0x18,
            gas_price: 0xfa56ea00,
            gas_limit: 119902,
            to: TxKind::Call(address!("06012c8cf97bead5deae237070f9587f8e7a266d")),
            value: U256::from(0x1c6bf526340000u64),
            input: hex!("f7d8c88300000000000000000000000000000000000000000000000000000000000cee6100000000000000000000000000000000000000000000000000000000000ac3e1").into(),
        };

        let signature = Signature::new(
            U256::from_be_bytes(
                b256!("2a378831cf81d99a3f06a18ae1b6ca366817ab4d88a70053c41d7a8f0368e031").0,
            ),
            U256::from_be_bytes(
                b256!("450d831a05b6e418724436c05c155e0a1b7b921015d0fbc2f667aed709ac4fb5").0,
            ),
            false,
        );

        let signed_tx = tx.into_signed(signature);

        assert_eq!(*signed_tx.hash(), hash, "Expected same hash");
        assert_eq!(signed_tx.recover_signer().unwrap(), signer, "Recovering signer should pass.");
    }

    #[test]
    fn signed_roundtrip_with_known_key() {
        let secret = B256::repeat_byte(0x46);
        let expected = crypto::secret_key_to_address(secret).unwrap();

        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0,
            gas_price: 1000,
            gas_limit: 21000,
            to: TxKind::Call(address!("3535353535353535353535353535353535353535")),
            value: U256::from(10u128.pow(18)),
            input: Bytes::new(),
        };

        let signature = crypto::sign_message(secret, tx.signature_hash()).unwrap();
        let signed = tx.clone().into_signed(signature);

        let mut encoded = Vec::new();
        signed.tx().encode_with_signature_fields(signed.signature(), &mut encoded);
        let decoded = TxLegacy::decode_signed_fields(&mut encoded.as_slice()).unwrap();

        assert_eq!(decoded.tx(), &tx);
        assert_eq!(decoded.hash(), signed.hash());
        assert_eq!(decoded.recover_signer().unwrap(), expected);
    }

    #[test]
    fn unprotected_v_has_no_chain_id() {
        let secret = B256::repeat_byte(0x11);
        let tx = TxLegacy { chain_id: None, gas_price: 1, gas_limit: 21000, ..Default::default() };
        let signature = crypto::sign_message(secret, tx.signature_hash()).unwrap();

        let v = to_eip155_value(signature.v(), None);
        assert!(v == 27 || v == 28);

        let signed = tx.into_signed(signature);
        let mut encoded = Vec::new();
        signed.tx().encode_with_signature_fields(signed.signature(), &mut encoded);
        let decoded = TxLegacy::decode_signed_fields(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.tx().chain_id, None);
    }
}
