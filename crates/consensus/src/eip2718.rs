//! [EIP-2718] typed-envelope traits.
//!
//! [EIP-2718]: https://eips.ethereum.org/EIPS/eip-2718

use alloy_rlp::{Buf, BufMut, Header, EMPTY_STRING_CODE};

// https://eips.ethereum.org/EIPS/eip-2718#transactiontype-only-goes-up-to-0x7f
const TX_TYPE_BYTE_MAX: u8 = 0x7f;

/// A type that carries an EIP-2718 type flag.
pub trait Typed2718 {
    /// Returns the EIP-2718 type flag. Legacy items report `0`.
    fn ty(&self) -> u8;

    /// True if the item is the untagged legacy variant.
    fn is_legacy(&self) -> bool {
        self.ty() == 0
    }
}

/// Decoding trait for [EIP-2718] envelopes. These envelopes wrap a transaction
/// or a receipt with a type flag.
///
/// [EIP-2718]: https://eips.ethereum.org/EIPS/eip-2718
pub trait Decodable2718: Sized {
    /// Extract the type byte from the buffer, if any. The type byte is the
    /// first byte, provided that that first byte is 0x7f or lower.
    fn extract_type_byte(buf: &mut &[u8]) -> Option<u8> {
        buf.first().copied().filter(|b| *b <= TX_TYPE_BYTE_MAX)
    }

    /// Decode the appropriate variant, based on the type flag.
    ///
    /// This function is invoked by [`Self::decode_2718`] with the type byte,
    /// and the tail of the buffer.
    fn typed_decode(ty: u8, buf: &mut &[u8]) -> alloy_rlp::Result<Self>;

    /// Decode the default (legacy) variant.
    ///
    /// This function is invoked by [`Self::decode_2718`] when no type byte
    /// can be extracted.
    fn fallback_decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self>;

    /// Decode an EIP-2718 item into a concrete instance.
    fn decode_2718(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        if let Some(ty) = Self::extract_type_byte(buf) {
            buf.advance(1);
            Self::typed_decode(ty, buf)
        } else {
            Self::fallback_decode(buf)
        }
    }

    /// Decode an EIP-2718 item in the network format.
    ///
    /// The network format is the RLP encoded string consisting of the
    /// type-flag prepended to an opaque inner encoding. The inner encoding is
    /// RLP for all current Ethereum transaction types.
    fn network_decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        // Keep the original buffer around by copying it.
        let mut h_decode = *buf;
        let h = Header::decode(&mut h_decode)?;

        // A list header means the untagged legacy form.
        if h.list {
            return Self::fallback_decode(buf);
        }
        *buf = h_decode;

        let remaining_len = buf.len();
        if remaining_len == 0 || remaining_len < h.payload_length {
            return Err(alloy_rlp::Error::InputTooShort);
        }

        let ty = buf[0];
        buf.advance(1);
        let item = Self::typed_decode(ty, buf)?;

        let bytes_consumed = remaining_len - buf.len();
        // Header::decode accepts single bytes (including the type flag itself)
        // as a string header with payload_length 1, so only enforce the length
        // for genuine string headers.
        if bytes_consumed != h.payload_length && h_decode[0] > EMPTY_STRING_CODE {
            return Err(alloy_rlp::Error::UnexpectedLength);
        }

        Ok(item)
    }
}

/// Encoding trait for [EIP-2718] envelopes.
///
/// [EIP-2718]: https://eips.ethereum.org/EIPS/eip-2718
pub trait Encodable2718: Typed2718 + Sized {
    /// Return the type flag, or `None` for the untagged legacy variant.
    fn type_flag(&self) -> Option<u8> {
        match self.ty() {
            0 => None,
            ty => Some(ty),
        }
    }

    /// The length of the 2718 encoded envelope: type flag plus the inner
    /// encoding.
    fn encode_2718_len(&self) -> usize;

    /// Encode the item according to [EIP-2718] rules: a 1-byte type flag in
    /// the range 0x00-0x7f, followed by the body, or the bare legacy list.
    ///
    /// [EIP-2718]: https://eips.ethereum.org/EIPS/eip-2718
    fn encode_2718(&self, out: &mut dyn BufMut);

    /// Convenience method encoding into a fresh `Vec`.
    fn encoded_2718(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encode_2718_len());
        self.encode_2718(&mut out);
        out
    }

    /// The network encoding: for typed items the 2718 encoding wrapped in an
    /// RLP string header, for legacy items the bare list.
    fn network_encode(&self, out: &mut dyn BufMut) {
        if !self.is_legacy() {
            Header { list: false, payload_length: self.encode_2718_len() }.encode(out);
        }
        self.encode_2718(out);
    }

    /// Length of [`Self::network_encode`] output.
    fn network_len(&self) -> usize {
        let mut payload_length = self.encode_2718_len();
        if !self.is_legacy() {
            payload_length += Header { list: false, payload_length }.length();
        }
        payload_length
    }
}
