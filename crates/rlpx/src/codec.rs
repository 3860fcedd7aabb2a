//! The RLPx frame codec: 16-byte encrypted headers, padded encrypted bodies,
//! and chained 16-byte MACs on both.

use crate::{
    secrets::{Aes256Ctr, MacState},
    FrameError, SessionSecrets,
};
use bytes::{Buf, Bytes, BytesMut};
use cipher::StreamCipher;
use tokio_util::codec::{Decoder, Encoder};

/// Largest frame body accepted, bounded by the 24-bit length field.
pub const MAX_FRAME_BODY: usize = (1 << 24) - 1;

/// Frame header metadata: `rlp([capability-id, context-id])`, always the
/// zero list since multiplexing by code made the fields vestigial.
const HEADER_DATA: [u8; 3] = [0xc2, 0x80, 0x80];

#[derive(Clone, Copy, Debug)]
enum DecodeState {
    Header,
    Body(usize),
}

/// Encrypts outgoing frame bodies and decrypts incoming ones, maintaining
/// the per-direction cipher streams and MAC chains.
pub struct FrameCodec {
    egress_aes: Aes256Ctr,
    egress_mac: MacState,
    ingress_aes: Aes256Ctr,
    ingress_mac: MacState,
    state: DecodeState,
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec").field("state", &self.state).finish_non_exhaustive()
    }
}

impl FrameCodec {
    /// Builds the codec from freshly derived session secrets.
    pub fn new(secrets: SessionSecrets) -> Self {
        let ((egress_aes, egress_mac), (ingress_aes, ingress_mac)) = secrets.split();
        Self { egress_aes, egress_mac, ingress_aes, ingress_mac, state: DecodeState::Header }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_FRAME_BODY {
            return Err(FrameError::FrameTooLarge(item.len()));
        }

        let mut header = [0u8; 16];
        header[..3].copy_from_slice(&(item.len() as u32).to_be_bytes()[1..]);
        header[3..6].copy_from_slice(&HEADER_DATA);
        self.egress_aes.apply_keystream(&mut header);
        let header_mac = self.egress_mac.header_mac(&header);

        dst.reserve(32 + item.len().div_ceil(16) * 16 + 16);
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&header_mac);

        let mut body = BytesMut::zeroed(item.len().div_ceil(16) * 16);
        body[..item.len()].copy_from_slice(&item);
        self.egress_aes.apply_keystream(&mut body);
        let body_mac = self.egress_mac.body_mac(&body);

        dst.extend_from_slice(&body);
        dst.extend_from_slice(&body_mac);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < 32 {
                        return Ok(None);
                    }
                    let mut header: [u8; 16] = src[..16].try_into().expect("length checked");
                    let expected = self.ingress_mac.header_mac(&header);
                    if expected != src[16..32] {
                        return Err(FrameError::MacMismatch);
                    }
                    self.ingress_aes.apply_keystream(&mut header);

                    let body_len =
                        u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
                    src.advance(32);
                    self.state = DecodeState::Body(body_len);
                }
                DecodeState::Body(body_len) => {
                    let padded = body_len.div_ceil(16) * 16;
                    if src.len() < padded + 16 {
                        return Ok(None);
                    }
                    let expected = self.ingress_mac.body_mac(&src[..padded]);
                    if expected != src[padded..padded + 16] {
                        return Err(FrameError::MacMismatch);
                    }

                    let mut body = src.split_to(padded);
                    src.advance(16);
                    self.ingress_aes.apply_keystream(&mut body);
                    body.truncate(body_len);

                    self.state = DecodeState::Header;
                    return Ok(Some(body));
                }
            }
        }
    }
}
