//! Typed transaction receipts.

use crate::eip2718::{Decodable2718, Encodable2718, Typed2718};
use crate::TxType;
use alloy_primitives::{Bloom, Log, B256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header};

/// The post-execution commitment of a receipt: a status code from Byzantium,
/// an intermediate state root before.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReceiptStatus {
    /// The [EIP-658](https://eips.ethereum.org/EIPS/eip-658) success flag.
    Eip658(bool),
    /// The pre-Byzantium intermediate state root.
    PostState(B256),
}

impl ReceiptStatus {
    /// True for a successful EIP-658 receipt; pre-Byzantium receipts carry no
    /// verdict and report `true`.
    pub const fn is_success(&self) -> bool {
        match self {
            Self::Eip658(success) => *success,
            Self::PostState(_) => true,
        }
    }
}

impl Default for ReceiptStatus {
    fn default() -> Self {
        Self::Eip658(true)
    }
}

impl Encodable for ReceiptStatus {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::Eip658(success) => success.encode(out),
            Self::PostState(root) => root.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Eip658(_) => 1,
            Self::PostState(root) => root.length(),
        }
    }
}

impl Decodable for ReceiptStatus {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        // a 32-byte string is a state root, anything shorter a status flag
        let mut peek = *buf;
        let header = Header::decode(&mut peek)?;
        if !header.list && header.payload_length == 32 {
            Ok(Self::PostState(B256::decode(buf)?))
        } else {
            Ok(Self::Eip658(bool::decode(buf)?))
        }
    }
}

/// The execution outcome of a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Receipt {
    /// The post-execution commitment.
    pub status: ReceiptStatus,
    /// Gas used by the block up to and including this transaction.
    pub cumulative_gas_used: u64,
    /// The logs emitted by the transaction.
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Computes the bloom filter over the receipt's logs.
    pub fn bloom_slow(&self) -> Bloom {
        let mut bloom = Bloom::ZERO;
        for log in &self.logs {
            bloom.accrue_log(log);
        }
        bloom
    }

    /// Attaches a freshly computed bloom.
    pub fn with_bloom(self) -> ReceiptWithBloom {
        let logs_bloom = self.bloom_slow();
        ReceiptWithBloom { receipt: self, logs_bloom }
    }
}

/// A receipt together with its log bloom, the shape committed to the receipts
/// trie and exchanged on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceiptWithBloom {
    /// The receipt.
    pub receipt: Receipt,
    /// The bloom filter over the receipt's logs.
    pub logs_bloom: Bloom,
}

impl ReceiptWithBloom {
    fn fields_len(&self) -> usize {
        self.receipt.status.length()
            + self.receipt.cumulative_gas_used.length()
            + self.logs_bloom.length()
            + self.receipt.logs.length()
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.receipt.status.encode(out);
        self.receipt.cumulative_gas_used.encode(out);
        self.logs_bloom.encode(out);
        self.receipt.logs.encode(out);
    }
}

impl Encodable for ReceiptWithBloom {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        Header { list: true, payload_length }.length() + payload_length
    }
}

impl Decodable for ReceiptWithBloom {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let original_len = buf.len();

        let status = ReceiptStatus::decode(buf)?;
        let cumulative_gas_used = u64::decode(buf)?;
        let logs_bloom = Bloom::decode(buf)?;
        let logs = Vec::<Log>::decode(buf)?;

        if original_len - buf.len() != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: original_len - buf.len(),
            });
        }

        Ok(Self { receipt: Receipt { status, cumulative_gas_used, logs }, logs_bloom })
    }
}

/// A typed receipt envelope, mirroring the transaction type of the
/// transaction that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ReceiptEnvelope {
    /// An untagged legacy receipt.
    Legacy(ReceiptWithBloom),
    /// A receipt of an EIP-2930 transaction.
    Eip2930(ReceiptWithBloom),
    /// A receipt of an EIP-1559 transaction.
    Eip1559(ReceiptWithBloom),
    /// A receipt of an EIP-4844 transaction.
    Eip4844(ReceiptWithBloom),
    /// A receipt of an EIP-7702 transaction.
    Eip7702(ReceiptWithBloom),
}

impl ReceiptEnvelope {
    /// The inner receipt with its bloom.
    pub const fn as_receipt_with_bloom(&self) -> &ReceiptWithBloom {
        match self {
            Self::Legacy(r)
            | Self::Eip2930(r)
            | Self::Eip1559(r)
            | Self::Eip4844(r)
            | Self::Eip7702(r) => r,
        }
    }

    /// The receipt's transaction type.
    pub const fn tx_type(&self) -> TxType {
        match self {
            Self::Legacy(_) => TxType::Legacy,
            Self::Eip2930(_) => TxType::Eip2930,
            Self::Eip1559(_) => TxType::Eip1559,
            Self::Eip4844(_) => TxType::Eip4844,
            Self::Eip7702(_) => TxType::Eip7702,
        }
    }

    fn from_typed(ty: TxType, receipt: ReceiptWithBloom) -> Self {
        match ty {
            TxType::Legacy => Self::Legacy(receipt),
            TxType::Eip2930 => Self::Eip2930(receipt),
            TxType::Eip1559 => Self::Eip1559(receipt),
            TxType::Eip4844 => Self::Eip4844(receipt),
            TxType::Eip7702 => Self::Eip7702(receipt),
        }
    }
}

impl Typed2718 for ReceiptEnvelope {
    fn ty(&self) -> u8 {
        self.tx_type() as u8
    }
}

impl Encodable2718 for ReceiptEnvelope {
    fn encode_2718_len(&self) -> usize {
        self.as_receipt_with_bloom().length() + !self.is_legacy() as usize
    }

    fn encode_2718(&self, out: &mut dyn BufMut) {
        if let Some(ty) = self.type_flag() {
            out.put_u8(ty);
        }
        self.as_receipt_with_bloom().encode(out);
    }
}

impl Decodable2718 for ReceiptEnvelope {
    fn typed_decode(ty: u8, buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let ty = TxType::try_from(ty)
            .map_err(|_| alloy_rlp::Error::Custom("unexpected receipt type"))?;
        if ty == TxType::Legacy {
            return Err(alloy_rlp::Error::Custom("type-0 eip2718 receipts are not supported"));
        }
        Ok(Self::from_typed(ty, ReceiptWithBloom::decode(buf)?))
    }

    fn fallback_decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self::Legacy(ReceiptWithBloom::decode(buf)?))
    }
}

impl Encodable for ReceiptEnvelope {
    fn encode(&self, out: &mut dyn BufMut) {
        self.network_encode(out)
    }

    fn length(&self) -> usize {
        self.network_len()
    }
}

impl Decodable for ReceiptEnvelope {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Self::network_decode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, LogData};

    fn sample_receipt() -> ReceiptWithBloom {
        Receipt {
            status: ReceiptStatus::Eip658(true),
            cumulative_gas_used: 21_000,
            logs: vec![Log {
                address: Address::repeat_byte(0x11),
                data: LogData::new_unchecked(
                    vec![B256::repeat_byte(0x22)],
                    vec![0xde, 0xad].into(),
                ),
            }],
        }
        .with_bloom()
    }

    #[test]
    fn legacy_roundtrip() {
        let envelope = ReceiptEnvelope::Legacy(sample_receipt());
        let mut buf = Vec::new();
        envelope.encode(&mut buf);
        let decoded = ReceiptEnvelope::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn typed_roundtrip() {
        for make in [ReceiptEnvelope::Eip2930, ReceiptEnvelope::Eip1559, ReceiptEnvelope::Eip4844, ReceiptEnvelope::Eip7702]
        {
            let envelope = make(sample_receipt());
            let mut buf = Vec::new();
            envelope.encode(&mut buf);
            let decoded = ReceiptEnvelope::decode(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn pre_byzantium_state_root() {
        let receipt = Receipt {
            status: ReceiptStatus::PostState(B256::repeat_byte(0x33)),
            cumulative_gas_used: 42_000,
            logs: vec![],
        }
        .with_bloom();
        let envelope = ReceiptEnvelope::Legacy(receipt);
        let mut buf = Vec::new();
        envelope.encode(&mut buf);
        let decoded = ReceiptEnvelope::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, envelope);
        assert!(decoded.as_receipt_with_bloom().receipt.status.is_success());
    }
}
