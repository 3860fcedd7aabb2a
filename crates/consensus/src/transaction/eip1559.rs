use crate::{
    transaction::{decode_signature_typed, encode_signature_fields, signature_fields_len},
    SignableTransaction, Signed, Transaction, Typed2718,
};
use alloy_eip2930::AccessList;
use alloy_eip7702::SignedAuthorization;
use alloy_primitives::{keccak256, Bytes, ChainId, Signature, TxKind, B256, U256};
use alloy_rlp::{length_of_length, BufMut, Decodable, Encodable, Header};

/// A transaction with a priority fee ([EIP-1559](https://eips.ethereum.org/EIPS/eip-1559)).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TxEip1559 {
    /// EIP-155: Simple replay attack protection.
    pub chain_id: ChainId,
    /// A scalar value equal to the number of transactions sent by the sender.
    pub nonce: u64,
    /// A scalar value equal to the maximum amount of gas that should be used
    /// in executing this transaction.
    pub gas_limit: u64,
    /// Maximum fee per unit of gas the sender is willing to pay, also known
    /// as `GasFeeCap`.
    pub max_fee_per_gas: u128,
    /// Maximum priority fee the transaction is paying to the block author,
    /// also known as `GasTipCap`.
    pub max_priority_fee_per_gas: u128,
    /// The 160-bit address of the message call's recipient, or create.
    pub to: TxKind,
    /// A scalar value equal to the number of Wei to be transferred to the
    /// message call's recipient, or endowment for a creation.
    pub value: U256,
    /// The addresses and storage keys the transaction plans to access.
    pub access_list: AccessList,
    /// The calldata of the call, or the EVM initialisation code for a
    /// creation.
    pub input: Bytes,
}

impl TxEip1559 {
    /// The EIP-2718 transaction type.
    pub const TX_TYPE: u8 = 2;

    /// Returns the effective gas price for the given `base_fee`.
    pub const fn effective_gas_price(&self, base_fee: Option<u64>) -> u128 {
        match base_fee {
            None => self.max_fee_per_gas,
            Some(base_fee) => {
                // if the tip is greater than the max priority fee per gas,
                // the price is capped at max priority fee + base fee
                let tip = self.max_fee_per_gas.saturating_sub(base_fee as u128);
                if tip > self.max_priority_fee_per_gas {
                    self.max_priority_fee_per_gas + base_fee as u128
                } else {
                    self.max_fee_per_gas
                }
            }
        }
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
    }

    /// Decodes the inner fields from RLP bytes, in signing order:
    /// `chain_id`, `nonce`, `max_priority_fee_per_gas`, `max_fee_per_gas`,
    /// `gas_limit`, `to`, `value`, `input`, `access_list`.
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

impl Typed2718 for TxEip1559 {
    fn ty(&self) -> u8 {
        Self::TX_TYPE
    }
}

impl Transaction for TxEip1559 {
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
        Self::effective_gas_price(self, base_fee)
    }

    fn is_dynamic_fee(&self) -> bool {
        true
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
        Some(&self.access_list)
    }

    fn blob_versioned_hashes(&self) -> Option<&[B256]> {
        None
    }

    fn authorization_list(&self) -> Option<&[SignedAuthorization]> {
        None
    }
}

impl SignableTransaction for TxEip1559 {
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

impl Encodable for TxEip1559 {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        length_of_length(payload_length) + payload_length
    }
}

impl Decodable for TxEip1559 {
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
    use alloy_primitives::address;

    const GWEI: u128 = 1_000_000_000;

    #[test]
    fn effective_gas_price_points() {
        let tx = TxEip1559 {
            max_priority_fee_per_gas: GWEI,
            max_fee_per_gas: 3 * GWEI,
            ..Default::default()
        };

        // base fee undefined: the fee cap
        assert_eq!(tx.effective_gas_price(None), 3 * GWEI);
        // base fee 1.5 gwei: base + full tip
        assert_eq!(tx.effective_gas_price(Some(1_500_000_000)), 2_500_000_000);
        // tip saturates at the fee cap
        assert_eq!(tx.effective_gas_price(Some(2_500_000_000)), 3 * GWEI);
        assert_eq!(tx.effective_gas_price(Some(5_000_000_000)), 3 * GWEI);
    }

    #[test]
    fn effective_gas_price_monotonic_in_base_fee() {
        let tx = TxEip1559 {
            max_priority_fee_per_gas: GWEI,
            max_fee_per_gas: 3 * GWEI,
            ..Default::default()
        };
        let mut prev = 0;
        for base_fee in (0..4_000_000_000u64).step_by(250_000_000) {
            let price = tx.effective_gas_price(Some(base_fee));
            assert!(price >= prev);
            assert!(price <= tx.max_fee_per_gas);
            prev = price;
        }
    }

    #[test]
    fn signed_roundtrip() {
        let secret = B256::repeat_byte(0x33);
        let tx = TxEip1559 {
            chain_id: 1,
            nonce: 0x42,
            gas_limit: 44386,
            to: TxKind::Call(address!("6069a6c32cf691f5982febae4faf8a6f3ab2f0f6")),
            value: U256::ZERO,
            input: Bytes::from(vec![0xa2, 0x2c, 0xb4, 0x65]),
            max_fee_per_gas: 0x4a817c800,
            max_priority_fee_per_gas: 0x3b9aca00,
            access_list: AccessList::default(),
        };

        let signature = crypto::sign_message(secret, tx.signature_hash()).unwrap();
        let signed = tx.clone().into_signed(signature);

        let mut buf = Vec::new();
        signed.tx().encode_with_signature(signed.signature(), &mut buf);
        let decoded = TxEip1559::decode_signed_fields(&mut buf.as_slice()).unwrap();

        assert_eq!(decoded.tx(), &tx);
        assert_eq!(decoded.hash(), signed.hash());
        assert_eq!(
            decoded.recover_signer().unwrap(),
            crypto::secret_key_to_address(secret).unwrap()
        );
    }
}
