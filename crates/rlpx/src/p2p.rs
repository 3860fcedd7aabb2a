//! The devp2p base protocol: Hello, Disconnect, Ping and Pong.

use crate::{DisconnectReason, P2PError, PeerId};
use alloy_rlp::{Buf, BufMut, Decodable, Encodable, Header, RlpDecodable, RlpEncodable};
use std::time::Duration;

/// The base protocol version this implementation speaks. Version 5 gates
/// snappy compression of sub-protocol payloads.
pub const BASE_PROTOCOL_VERSION: u8 = 5;

/// Number of message ids reserved for the base protocol; sub-protocol
/// offsets start here.
pub const BASE_PROTOCOL_LENGTH: u8 = 16;

/// Largest accepted size of a decompressed message payload.
pub const MAX_PAYLOAD_SIZE: usize = 16 << 20;

/// Interval between keepalive pings once the Hello exchange completed.
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// How long a missing pong is tolerated before the connection is considered
/// dead.
pub const PING_TIMEOUT: Duration = Duration::from_secs(30);

/// A named, versioned sub-protocol advertised in Hello.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, RlpEncodable, RlpDecodable)]
pub struct Capability {
    /// The short ASCII protocol name, e.g. `eth`.
    pub name: String,
    /// The protocol version.
    pub version: u8,
}

impl Capability {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, version: u8) -> Self {
        Self { name: name.into(), version }
    }

    /// The `eth` capability at the given version.
    pub fn eth(version: u8) -> Self {
        Self::new("eth", version)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// The first message of a session: protocol version, client identity and
/// capability list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelloMessage {
    /// The base protocol version.
    pub protocol_version: u8,
    /// Free-form client identifier, e.g. `ethp2p/v0.1.0`.
    pub client_id: String,
    /// The sub-protocols this node speaks.
    pub capabilities: Vec<Capability>,
    /// The node's listening port, zero if not listening.
    pub port: u16,
    /// The node's public key.
    pub id: PeerId,
}

impl Encodable for HelloMessage {
    fn encode(&self, out: &mut dyn BufMut) {
        let payload_length = self.protocol_version.length()
            + self.client_id.length()
            + self.capabilities.length()
            + self.port.length()
            + self.id.length();
        Header { list: true, payload_length }.encode(out);
        self.protocol_version.encode(out);
        self.client_id.encode(out);
        self.capabilities.encode(out);
        self.port.encode(out);
        self.id.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.protocol_version.length()
            + self.client_id.length()
            + self.capabilities.length()
            + self.port.length()
            + self.id.length();
        Header { list: true, payload_length }.length() + payload_length
    }
}

impl Decodable for HelloMessage {
    /// Trailing list elements are ignored for forward compatibility.
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        if buf.len() < header.payload_length {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let mut body = &buf[..header.payload_length];

        let hello = Self {
            protocol_version: u8::decode(&mut body)?,
            client_id: String::decode(&mut body)?,
            capabilities: Vec::<Capability>::decode(&mut body)?,
            port: u16::decode(&mut body)?,
            id: PeerId::decode(&mut body)?,
        };
        buf.advance(header.payload_length);
        Ok(hello)
    }
}

/// A base-protocol message, ids `0x00` to `0x03`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum P2PMessage {
    /// `0x00` the post-handshake greeting.
    Hello(HelloMessage),
    /// `0x01` orderly teardown with a reason.
    Disconnect(DisconnectReason),
    /// `0x02` keepalive probe.
    Ping,
    /// `0x03` keepalive answer.
    Pong,
}

impl P2PMessage {
    /// The message id of the Hello message.
    pub const HELLO: u8 = 0x00;
    /// The message id of the Disconnect message.
    pub const DISCONNECT: u8 = 0x01;
    /// The message id of the Ping message.
    pub const PING: u8 = 0x02;
    /// The message id of the Pong message.
    pub const PONG: u8 = 0x03;

    /// The message id.
    pub const fn message_id(&self) -> u8 {
        match self {
            Self::Hello(_) => Self::HELLO,
            Self::Disconnect(_) => Self::DISCONNECT,
            Self::Ping => Self::PING,
            Self::Pong => Self::PONG,
        }
    }

    /// Encodes the message payload (without the id).
    pub fn encode_payload(&self, out: &mut dyn BufMut) {
        match self {
            Self::Hello(hello) => hello.encode(out),
            Self::Disconnect(reason) => reason.encode(out),
            // pings and pongs carry an empty list
            Self::Ping | Self::Pong => out.put_u8(alloy_rlp::EMPTY_LIST_CODE),
        }
    }

    /// Decodes the payload of the message with the given base-protocol id.
    pub fn decode_payload(id: u8, payload: &[u8]) -> Result<Self, P2PError> {
        let mut buf = payload;
        match id {
            Self::HELLO => Ok(Self::Hello(HelloMessage::decode(&mut buf)?)),
            Self::DISCONNECT => {
                // an empty disconnect payload appears in the wild
                if buf.is_empty() {
                    return Ok(Self::Disconnect(DisconnectReason::DisconnectRequested));
                }
                Ok(Self::Disconnect(DisconnectReason::decode(&mut buf)?))
            }
            Self::PING => Ok(Self::Ping),
            Self::PONG => Ok(Self::Pong),
            other => Err(P2PError::UnknownMessageId(other)),
        }
    }
}

/// Compresses a sub-protocol payload with raw snappy.
pub(crate) fn compress_payload(payload: &[u8]) -> Vec<u8> {
    let mut encoder = snap::raw::Encoder::new();
    encoder.compress_vec(payload).expect("snappy compression of an in-memory buffer")
}

/// Decompresses a sub-protocol payload, rejecting payloads that inflate past
/// [`MAX_PAYLOAD_SIZE`].
pub(crate) fn decompress_payload(payload: &[u8]) -> Result<Vec<u8>, P2PError> {
    let len = snap::raw::decompress_len(payload)?;
    if len > MAX_PAYLOAD_SIZE {
        return Err(P2PError::PayloadTooLarge(len));
    }
    let mut decoder = snap::raw::Decoder::new();
    Ok(decoder.decompress_vec(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hello() -> HelloMessage {
        HelloMessage {
            protocol_version: BASE_PROTOCOL_VERSION,
            client_id: "ethp2p/v0.1.0".to_string(),
            capabilities: vec![Capability::eth(67), Capability::eth(68)],
            port: 30303,
            id: PeerId::repeat_byte(0x80),
        }
    }

    #[test]
    fn hello_roundtrip() {
        let hello = sample_hello();
        let encoded = alloy_rlp::encode(&hello);
        assert_eq!(encoded.len(), hello.length());
        let decoded = HelloMessage::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn hello_ignores_trailing_fields() {
        let hello = sample_hello();
        // re-encode with an extra trailing element in the list
        let mut fields = Vec::new();
        hello.protocol_version.encode(&mut fields);
        hello.client_id.encode(&mut fields);
        hello.capabilities.encode(&mut fields);
        hello.port.encode(&mut fields);
        hello.id.encode(&mut fields);
        42u8.encode(&mut fields);
        let mut encoded = Vec::new();
        Header { list: true, payload_length: fields.len() }.encode(&mut encoded);
        encoded.extend_from_slice(&fields);

        let decoded = HelloMessage::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn payload_roundtrip_all_messages() {
        let messages = [
            P2PMessage::Hello(sample_hello()),
            P2PMessage::Disconnect(DisconnectReason::TooManyPeers),
            P2PMessage::Ping,
            P2PMessage::Pong,
        ];
        for message in messages {
            let mut payload = Vec::new();
            message.encode_payload(&mut payload);
            let decoded = P2PMessage::decode_payload(message.message_id(), &payload).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn snappy_roundtrip() {
        let payload = vec![7u8; 4096];
        let compressed = compress_payload(&payload);
        assert!(compressed.len() < payload.len());
        assert_eq!(decompress_payload(&compressed).unwrap(), payload);
    }
}
