use crate::constants::{EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH};
use alloy_primitives::{keccak256, Address, BlockNumber, Bloom, Bytes, B256, B64, U256};
use alloy_rlp::{
    length_of_length, Buf, BufMut, Decodable, Encodable, EMPTY_LIST_CODE, EMPTY_STRING_CODE,
};

/// Ethereum block header.
///
/// Post-merge fields are optional; the placeholder scheme in the RLP encoding
/// keeps a header with a later field but not an earlier one decodable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Header {
    /// The Keccak 256-bit hash of the parent block's header.
    pub parent_hash: B256,
    /// The Keccak 256-bit hash of the ommers list portion of this block.
    pub ommers_hash: B256,
    /// The 160-bit address to which priority fees from this block are
    /// transferred.
    pub beneficiary: Address,
    /// The Keccak 256-bit hash of the root node of the state trie after all
    /// transactions are executed and finalisations applied.
    pub state_root: B256,
    /// The Keccak 256-bit hash of the root node of the transactions trie.
    pub transactions_root: B256,
    /// The Keccak 256-bit hash of the root node of the receipts trie.
    pub receipts_root: B256,
    /// The Bloom filter composed from indexable information contained in each
    /// log entry of every transaction receipt.
    pub logs_bloom: Bloom,
    /// A scalar value corresponding to the difficulty level of this block;
    /// zero post-merge.
    pub difficulty: U256,
    /// A scalar value equal to the number of ancestor blocks.
    pub number: BlockNumber,
    /// A scalar value equal to the current limit of gas expenditure per
    /// block.
    pub gas_limit: u64,
    /// A scalar value equal to the total gas used in transactions in this
    /// block.
    pub gas_used: u64,
    /// A scalar value equal to the output of Unix time() at this block's
    /// inception.
    pub timestamp: u64,
    /// An arbitrary byte array containing data relevant to this block; 32
    /// bytes or fewer.
    pub extra_data: Bytes,
    /// Proof-of-work mix hash; `prevRandao` post-merge.
    pub mix_hash: B256,
    /// Proof-of-work nonce; zero post-merge.
    pub nonce: B64,
    /// The EIP-1559 base fee, present from London.
    pub base_fee_per_gas: Option<u64>,
    /// The Keccak 256-bit hash of the withdrawals list, present from
    /// Shanghai.
    pub withdrawals_root: Option<B256>,
    /// Total blob gas consumed by the block's transactions, present from
    /// Cancun.
    pub blob_gas_used: Option<u64>,
    /// Running total of blob gas consumed in excess of the target, present
    /// from Cancun.
    pub excess_blob_gas: Option<u64>,
    /// The parent beacon block root, present from Cancun.
    pub parent_beacon_block_root: Option<B256>,
    /// Commitment to the block's execution-layer requests, present from
    /// Prague.
    pub requests_hash: Option<B256>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            parent_hash: Default::default(),
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            beneficiary: Default::default(),
            state_root: EMPTY_ROOT_HASH,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            logs_bloom: Default::default(),
            difficulty: Default::default(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: Default::default(),
            mix_hash: Default::default(),
            nonce: B64::ZERO,
            base_fee_per_gas: None,
            withdrawals_root: None,
            blob_gas_used: None,
            excess_blob_gas: None,
            parent_beacon_block_root: None,
            requests_hash: None,
        }
    }
}

impl Header {
    /// Heavy function that computes the header hash.
    pub fn hash_slow(&self) -> B256 {
        let mut out = Vec::<u8>::new();
        self.encode(&mut out);
        keccak256(&out)
    }

    /// Checks if the header commits to an empty body.
    pub fn is_empty(&self) -> bool {
        let txs_and_ommers_empty =
            self.transactions_root == EMPTY_ROOT_HASH && self.ommers_hash == EMPTY_OMMER_ROOT_HASH;
        match self.withdrawals_root {
            Some(root) => txs_and_ommers_empty && root == EMPTY_ROOT_HASH,
            None => txs_and_ommers_empty,
        }
    }

    fn header_payload_length(&self) -> usize {
        let mut length = 0;
        length += self.parent_hash.length();
        length += self.ommers_hash.length();
        length += self.beneficiary.length();
        length += self.state_root.length();
        length += self.transactions_root.length();
        length += self.receipts_root.length();
        length += self.logs_bloom.length();
        length += self.difficulty.length();
        length += self.number.length();
        length += self.gas_limit.length();
        length += self.gas_used.length();
        length += self.timestamp.length();
        length += self.extra_data.length();
        length += self.mix_hash.length();
        length += self.nonce.length();

        if let Some(base_fee) = self.base_fee_per_gas {
            length += base_fee.length();
        } else if self.withdrawals_root.is_some()
            || self.blob_gas_used.is_some()
            || self.excess_blob_gas.is_some()
            || self.parent_beacon_block_root.is_some()
            || self.requests_hash.is_some()
        {
            length += 1; // EMPTY LIST CODE
        }

        if let Some(root) = self.withdrawals_root {
            length += root.length();
        } else if self.blob_gas_used.is_some()
            || self.excess_blob_gas.is_some()
            || self.parent_beacon_block_root.is_some()
            || self.requests_hash.is_some()
        {
            length += 1; // EMPTY STRING CODE
        }

        if let Some(blob_gas_used) = self.blob_gas_used {
            length += blob_gas_used.length();
        } else if self.excess_blob_gas.is_some()
            || self.parent_beacon_block_root.is_some()
            || self.requests_hash.is_some()
        {
            length += 1; // EMPTY LIST CODE
        }

        if let Some(excess_blob_gas) = self.excess_blob_gas {
            length += excess_blob_gas.length();
        } else if self.parent_beacon_block_root.is_some() || self.requests_hash.is_some() {
            length += 1; // EMPTY LIST CODE
        }

        if let Some(parent_beacon_block_root) = self.parent_beacon_block_root {
            length += parent_beacon_block_root.length();
        } else if self.requests_hash.is_some() {
            length += 1; // EMPTY LIST CODE
        }

        // If new fields are added, the above pattern must be repeated with a
        // placeholder for every earlier absent field, otherwise it is
        // impossible to tell which fields are missing.
        if let Some(requests_hash) = self.requests_hash {
            length += requests_hash.length();
        }

        length
    }
}

impl Encodable for Header {
    fn encode(&self, out: &mut dyn BufMut) {
        alloy_rlp::Header { list: true, payload_length: self.header_payload_length() }.encode(out);
        self.parent_hash.encode(out);
        self.ommers_hash.encode(out);
        self.beneficiary.encode(out);
        self.state_root.encode(out);
        self.transactions_root.encode(out);
        self.receipts_root.encode(out);
        self.logs_bloom.encode(out);
        self.difficulty.encode(out);
        self.number.encode(out);
        self.gas_limit.encode(out);
        self.gas_used.encode(out);
        self.timestamp.encode(out);
        self.extra_data.encode(out);
        self.mix_hash.encode(out);
        self.nonce.encode(out);

        if let Some(base_fee) = self.base_fee_per_gas {
            base_fee.encode(out);
        } else if self.withdrawals_root.is_some()
            || self.blob_gas_used.is_some()
            || self.excess_blob_gas.is_some()
            || self.parent_beacon_block_root.is_some()
            || self.requests_hash.is_some()
        {
            out.put_u8(EMPTY_LIST_CODE);
        }

        if let Some(ref root) = self.withdrawals_root {
            root.encode(out);
        } else if self.blob_gas_used.is_some()
            || self.excess_blob_gas.is_some()
            || self.parent_beacon_block_root.is_some()
            || self.requests_hash.is_some()
        {
            out.put_u8(EMPTY_STRING_CODE);
        }

        if let Some(blob_gas_used) = self.blob_gas_used {
            blob_gas_used.encode(out);
        } else if self.excess_blob_gas.is_some()
            || self.parent_beacon_block_root.is_some()
            || self.requests_hash.is_some()
        {
            out.put_u8(EMPTY_LIST_CODE);
        }

        if let Some(excess_blob_gas) = self.excess_blob_gas {
            excess_blob_gas.encode(out);
        } else if self.parent_beacon_block_root.is_some() || self.requests_hash.is_some() {
            out.put_u8(EMPTY_LIST_CODE);
        }

        if let Some(ref parent_beacon_block_root) = self.parent_beacon_block_root {
            parent_beacon_block_root.encode(out);
        } else if self.requests_hash.is_some() {
            out.put_u8(EMPTY_LIST_CODE);
        }

        if let Some(ref requests_hash) = self.requests_hash {
            requests_hash.encode(out);
        }
    }

    fn length(&self) -> usize {
        let payload_length = self.header_payload_length();
        length_of_length(payload_length) + payload_length
    }
}

impl Decodable for Header {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let rlp_head = alloy_rlp::Header::decode(buf)?;
        if !rlp_head.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();
        let mut this = Self {
            parent_hash: Decodable::decode(buf)?,
            ommers_hash: Decodable::decode(buf)?,
            beneficiary: Decodable::decode(buf)?,
            state_root: Decodable::decode(buf)?,
            transactions_root: Decodable::decode(buf)?,
            receipts_root: Decodable::decode(buf)?,
            logs_bloom: Decodable::decode(buf)?,
            difficulty: Decodable::decode(buf)?,
            number: u64::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            gas_used: u64::decode(buf)?,
            timestamp: Decodable::decode(buf)?,
            extra_data: Decodable::decode(buf)?,
            mix_hash: Decodable::decode(buf)?,
            nonce: B64::decode(buf)?,
            base_fee_per_gas: None,
            withdrawals_root: None,
            blob_gas_used: None,
            excess_blob_gas: None,
            parent_beacon_block_root: None,
            requests_hash: None,
        };

        if started_len - buf.len() < rlp_head.payload_length {
            if buf.first().is_some_and(|b| *b == EMPTY_LIST_CODE) {
                buf.advance(1)
            } else {
                this.base_fee_per_gas = Some(u64::decode(buf)?);
            }
        }

        // Withdrawals root for post-shanghai headers
        if started_len - buf.len() < rlp_head.payload_length {
            if buf.first().is_some_and(|b| *b == EMPTY_STRING_CODE) {
                buf.advance(1)
            } else {
                this.withdrawals_root = Some(Decodable::decode(buf)?);
            }
        }

        // Blob gas used and excess blob gas for post-cancun headers
        if started_len - buf.len() < rlp_head.payload_length {
            if buf.first().is_some_and(|b| *b == EMPTY_LIST_CODE) {
                buf.advance(1)
            } else {
                this.blob_gas_used = Some(u64::decode(buf)?);
            }
        }

        if started_len - buf.len() < rlp_head.payload_length {
            if buf.first().is_some_and(|b| *b == EMPTY_LIST_CODE) {
                buf.advance(1)
            } else {
                this.excess_blob_gas = Some(u64::decode(buf)?);
            }
        }

        if started_len - buf.len() < rlp_head.payload_length {
            if buf.first().is_some_and(|b| *b == EMPTY_LIST_CODE) {
                buf.advance(1)
            } else {
                this.parent_beacon_block_root = Some(B256::decode(buf)?);
            }
        }

        if started_len - buf.len() < rlp_head.payload_length {
            this.requests_hash = Some(B256::decode(buf)?);
        }

        let consumed = started_len - buf.len();
        if consumed != rlp_head.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: rlp_head.payload_length,
                got: consumed,
            });
        }
        Ok(this)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(header: &Header) {
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), header.length());
        let decoded = Header::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(&decoded, header);
    }

    #[test]
    fn roundtrip_pre_london() {
        roundtrip(&Header {
            number: 100,
            gas_limit: 8_000_000,
            gas_used: 21_000,
            timestamp: 1_600_000_000,
            difficulty: U256::from(0x20000u64),
            ..Default::default()
        });
    }

    #[test]
    fn roundtrip_post_cancun() {
        roundtrip(&Header {
            number: 19_000_000,
            gas_limit: 30_000_000,
            gas_used: 12_345_678,
            timestamp: 1_700_000_000,
            base_fee_per_gas: Some(7),
            withdrawals_root: Some(EMPTY_ROOT_HASH),
            blob_gas_used: Some(131_072),
            excess_blob_gas: Some(0),
            parent_beacon_block_root: Some(B256::repeat_byte(0xbe)),
            ..Default::default()
        });
    }

    #[test]
    fn roundtrip_post_prague() {
        roundtrip(&Header {
            number: 21_000_000,
            base_fee_per_gas: Some(10),
            withdrawals_root: Some(EMPTY_ROOT_HASH),
            blob_gas_used: Some(0),
            excess_blob_gas: Some(0),
            parent_beacon_block_root: Some(B256::repeat_byte(0x11)),
            requests_hash: Some(B256::repeat_byte(0x22)),
            ..Default::default()
        });
    }

    #[test]
    fn hash_changes_with_fields() {
        let a = Header::default();
        let b = Header { number: 1, ..Default::default() };
        assert_ne!(a.hash_slow(), b.hash_slow());
    }
}
