//! Request messages and the request-id pairing introduced in eth/66.

use alloy_primitives::B256;
use alloy_rlp::{
    BufMut, Decodable, Encodable, Header, RlpDecodable, RlpDecodableWrapper, RlpEncodable,
    RlpEncodableWrapper,
};

/// A request or response body paired with the session-scoped request id that
/// correlates them, `rlp([request-id, body])`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RequestPair<T> {
    /// The id tying a response to its request.
    pub request_id: u64,
    /// The request or response body.
    pub message: T,
}

impl<T: Encodable> Encodable for RequestPair<T> {
    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.request_id.length() + self.message.length();
        Header { list: true, payload_length }.encode(out);
        self.request_id.encode(out);
        self.message.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.request_id.length() + self.message.length();
        Header { list: true, payload_length }.length() + payload_length
    }
}

impl<T: Decodable> Decodable for RequestPair<T> {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let started_len = buf.len();

        let request_id = u64::decode(buf)?;
        let message = T::decode(buf)?;

        if started_len - buf.len() != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: started_len - buf.len(),
            });
        }
        Ok(Self { request_id, message })
    }
}

/// A block identifier: either a hash or a height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockHashOrNumber {
    /// Identify the block by hash.
    Hash(B256),
    /// Identify the block by height.
    Number(u64),
}

impl From<B256> for BlockHashOrNumber {
    fn from(hash: B256) -> Self {
        Self::Hash(hash)
    }
}

impl From<u64> for BlockHashOrNumber {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl Encodable for BlockHashOrNumber {
    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::Hash(hash) => hash.encode(out),
            Self::Number(number) => number.encode(out),
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Hash(hash) => hash.length(),
            Self::Number(number) => number.length(),
        }
    }
}

impl Decodable for BlockHashOrNumber {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        // a 32-byte string is a hash, any shorter string a number
        let mut peek = *buf;
        let header = Header::decode(&mut peek)?;
        if !header.list && header.payload_length == 32 {
            Ok(Self::Hash(B256::decode(buf)?))
        } else {
            Ok(Self::Number(u64::decode(buf)?))
        }
    }
}

/// `GetBlockHeaders`: a contiguous or strided header range starting at a
/// hash or a height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, RlpEncodable, RlpDecodable)]
pub struct GetBlockHeaders {
    /// The first block of the range.
    pub start_block: BlockHashOrNumber,
    /// Maximum number of headers wanted.
    pub limit: u64,
    /// Blocks skipped between consecutive headers; zero for a contiguous
    /// range.
    pub skip: u32,
    /// Walk the chain backwards from `start_block`.
    pub reverse: bool,
}

/// `GetBlockBodies`: bodies for the given block hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodableWrapper, RlpDecodableWrapper)]
pub struct GetBlockBodies(
    /// The hashes of the blocks whose bodies are wanted.
    pub Vec<B256>,
);

/// `GetPooledTransactions`: full transactions for announced hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodableWrapper, RlpDecodableWrapper)]
pub struct GetPooledTransactions(
    /// The announced transaction hashes.
    pub Vec<B256>,
);

/// `GetReceipts`: receipt lists for the given block hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodableWrapper, RlpDecodableWrapper)]
pub struct GetReceipts(
    /// The hashes of the blocks whose receipts are wanted.
    pub Vec<B256>,
);

/// `GetNodeData`: state trie nodes by hash; withdrawn after eth/66.
#[derive(Clone, Debug, Default, PartialEq, Eq, RlpEncodableWrapper, RlpDecodableWrapper)]
pub struct GetNodeData(
    /// The node hashes wanted.
    pub Vec<B256>,
);

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    #[test]
    fn request_pair_shape() {
        // [reqId, [hash]] as a nested list
        let pair = RequestPair {
            request_id: 0x1111,
            message: GetBlockBodies(vec![B256::repeat_byte(0xaa)]),
        };
        let mut buf = Vec::new();
        pair.encode(&mut buf);
        assert_eq!(buf.len(), pair.length());

        let decoded = RequestPair::<GetBlockBodies>::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, pair);
    }

    #[test]
    fn get_block_headers_roundtrip() {
        for start in
            [BlockHashOrNumber::Number(9000), BlockHashOrNumber::Hash(B256::repeat_byte(0x77))]
        {
            let request = RequestPair {
                request_id: 99,
                message: GetBlockHeaders { start_block: start, limit: 10, skip: 2, reverse: true },
            };
            let mut buf = Vec::new();
            request.encode(&mut buf);
            let decoded = RequestPair::<GetBlockHeaders>::decode(&mut buf.as_slice()).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    // Known encoding from the eth/66 specification examples:
    // [1111, [9999, 5, 5, false]]
    fn get_block_headers_known_vector() {
        let expected = hex!("ca820457c682270f050580");
        let request = RequestPair {
            request_id: 1111,
            message: GetBlockHeaders {
                start_block: BlockHashOrNumber::Number(9999),
                limit: 5,
                skip: 5,
                reverse: false,
            },
        };
        let mut buf = Vec::new();
        request.encode(&mut buf);
        assert_eq!(buf[..], expected[..]);
    }

    #[test]
    fn hash_or_number_disambiguates() {
        // a number that is exactly 32 bytes long cannot appear: numbers are
        // minimal-length, hashes always 32 bytes
        let hash = BlockHashOrNumber::Hash(B256::repeat_byte(1));
        let number = BlockHashOrNumber::Number(u64::MAX);

        for value in [hash, number] {
            let mut buf = Vec::new();
            value.encode(&mut buf);
            assert_eq!(BlockHashOrNumber::decode(&mut buf.as_slice()).unwrap(), value);
        }
    }
}
