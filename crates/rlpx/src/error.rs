//! Transport error taxonomy.

use alloy_rlp::{Decodable, Encodable};

/// Errors raised during the ECIES handshake.
#[derive(Debug, thiserror::Error)]
pub enum EciesError {
    /// I/O failure on the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A curve-level failure: bad public key, bad signature.
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
    /// The authentication tag of an ECIES message did not verify.
    #[error("ECIES message authentication failed")]
    TagMismatch,
    /// The message is shorter than the ECIES overhead.
    #[error("ECIES message too short")]
    MessageTooShort,
    /// The auth or ack body was not well-formed RLP.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
    /// The remote signed with a key that does not match its claimed node id.
    #[error("remote node id does not match handshake key")]
    NodeIdMismatch,
}

/// Errors raised by the frame codec after the handshake.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// I/O failure on the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A header or body MAC did not verify.
    #[error("frame MAC mismatch")]
    MacMismatch,
    /// The frame advertises a body larger than the configured maximum.
    #[error("frame body of {0} bytes exceeds the maximum")]
    FrameTooLarge(usize),
    /// The frame header metadata was not well-formed RLP.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
}

/// Errors in the devp2p base protocol.
#[derive(Debug, thiserror::Error)]
pub enum P2PError {
    /// The first message after the handshake was not a Hello.
    #[error("expected Hello, got message id {0}")]
    HelloExpected(u8),
    /// The remote disconnected during the handshake.
    #[error("disconnected during handshake: {0}")]
    HandshakeDisconnect(DisconnectReason),
    /// No capability is shared with the remote.
    #[error("no shared capabilities")]
    NoSharedCapabilities,
    /// A message id outside every negotiated capability range.
    #[error("message id {0} outside negotiated ranges")]
    UnknownMessageId(u8),
    /// A payload failed to decompress.
    #[error("snappy decompression failed: {0}")]
    Decompress(#[from] snap::Error),
    /// A decompressed payload above the allowed size.
    #[error("payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(usize),
    /// Malformed RLP in a base-protocol message.
    #[error(transparent)]
    Rlp(#[from] alloy_rlp::Error),
}

/// Connection-level errors, the union of the layers below plus timeouts.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// ECIES handshake failure.
    #[error(transparent)]
    Ecies(#[from] EciesError),
    /// Frame-level failure.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Base-protocol failure.
    #[error(transparent)]
    P2P(#[from] P2PError),
    /// I/O failure on the underlying stream.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A handshake step exceeded its deadline.
    #[error("handshake timed out")]
    HandshakeTimeout,
    /// The remote went away mid-handshake or mid-frame.
    #[error("connection closed by remote")]
    StreamClosed,
    /// The remote sent a Disconnect message.
    #[error("disconnected by peer: {0}")]
    Disconnected(DisconnectReason),
}

/// RLPx disconnect reasons, codes `0x00` to `0x10`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// `0x00` Disconnect requested.
    #[default]
    DisconnectRequested = 0x00,
    /// `0x01` TCP sub-system error.
    TcpSubsystemError = 0x01,
    /// `0x02` Breach of protocol.
    ProtocolBreach = 0x02,
    /// `0x03` Useless peer.
    UselessPeer = 0x03,
    /// `0x04` Too many peers.
    TooManyPeers = 0x04,
    /// `0x05` Already connected.
    AlreadyConnected = 0x05,
    /// `0x06` Incompatible p2p protocol version.
    IncompatibleP2PProtocolVersion = 0x06,
    /// `0x07` Null node identity received.
    NullNodeIdentity = 0x07,
    /// `0x08` Client quitting.
    ClientQuitting = 0x08,
    /// `0x09` Unexpected handshake identity.
    UnexpectedHandshakeIdentity = 0x09,
    /// `0x0a` Identity is the same as this node.
    ConnectedToSelf = 0x0a,
    /// `0x0b` Ping timeout.
    PingTimeout = 0x0b,
    /// `0x10` Some other reason specific to a sub-protocol.
    SubprotocolSpecific = 0x10,
}

impl DisconnectReason {
    /// All defined reasons, in code order.
    pub const ALL: [Self; 13] = [
        Self::DisconnectRequested,
        Self::TcpSubsystemError,
        Self::ProtocolBreach,
        Self::UselessPeer,
        Self::TooManyPeers,
        Self::AlreadyConnected,
        Self::IncompatibleP2PProtocolVersion,
        Self::NullNodeIdentity,
        Self::ClientQuitting,
        Self::UnexpectedHandshakeIdentity,
        Self::ConnectedToSelf,
        Self::PingTimeout,
        Self::SubprotocolSpecific,
    ];
}

impl core::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let message = match self {
            Self::DisconnectRequested => "disconnect requested",
            Self::TcpSubsystemError => "TCP sub-system error",
            Self::ProtocolBreach => "breach of protocol",
            Self::UselessPeer => "useless peer",
            Self::TooManyPeers => "too many peers",
            Self::AlreadyConnected => "already connected",
            Self::IncompatibleP2PProtocolVersion => "incompatible p2p protocol version",
            Self::NullNodeIdentity => "null node identity received",
            Self::ClientQuitting => "client quitting",
            Self::UnexpectedHandshakeIdentity => "unexpected handshake identity",
            Self::ConnectedToSelf => "connected to self",
            Self::PingTimeout => "ping timeout",
            Self::SubprotocolSpecific => "subprotocol-specific reason",
        };
        f.write_str(message)
    }
}

impl TryFrom<u8> for DisconnectReason {
    type Error = alloy_rlp::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|reason| *reason as u8 == value)
            .ok_or(alloy_rlp::Error::Custom("unknown disconnect reason"))
    }
}

impl Encodable for DisconnectReason {
    /// Encodes as a single-element list, the form geth emits.
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        alloy_rlp::Header { list: true, payload_length: 1 }.encode(out);
        (*self as u8).encode(out);
    }

    fn length(&self) -> usize {
        2
    }
}

impl Decodable for DisconnectReason {
    /// Accepts both the bare reason byte and the single-element list form,
    /// both of which appear in the wild.
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        if buf.is_empty() {
            return Err(alloy_rlp::Error::InputTooShort);
        }
        let reason = if buf[0] >= alloy_rlp::EMPTY_LIST_CODE {
            let header = alloy_rlp::Header::decode(buf)?;
            if header.payload_length != 1 {
                return Err(alloy_rlp::Error::ListLengthMismatch {
                    expected: 1,
                    got: header.payload_length,
                });
            }
            u8::decode(buf)?
        } else {
            u8::decode(buf)?
        };
        Self::try_from(reason)
    }
}
