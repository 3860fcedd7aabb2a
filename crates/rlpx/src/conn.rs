//! The per-connection driver: handshake orchestration, the message layer on
//! top of the frame codec, and the connection state machine.

use crate::{
    ecies::{Handshake, LEGACY_ACK_SIZE, LEGACY_AUTH_SIZE},
    mux::{negotiate_capabilities, route_message_id, RoutedCode},
    p2p::{compress_payload, decompress_payload},
    Capability, ConnectionError, DisconnectReason, EciesError, FrameCodec, HelloMessage,
    P2PError, P2PMessage, PeerId, SharedCapability, BASE_PROTOCOL_VERSION,
};
use alloy_primitives::{B256, B512};
use alloy_rlp::{Decodable, Encodable};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

/// Which side opened the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// We dialled the remote.
    Outbound,
    /// The remote dialled us.
    Inbound,
}

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Inbound connection waiting for the auth message.
    AwaitingAuth,
    /// Outbound connection waiting for the ack message.
    AwaitingAck,
    /// Session keys derived, Hello not yet exchanged.
    Authenticated,
    /// Hello received, capabilities being negotiated.
    HelloExchanged,
    /// Fully established; sub-protocol traffic flows.
    Active,
    /// Torn down; no further messages.
    Closed,
}

/// Local configuration of a connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// The node's static secret key.
    pub secret_key: B256,
    /// Free-form client identifier advertised in Hello.
    pub client_id: String,
    /// Capabilities advertised in Hello.
    pub capabilities: Vec<Capability>,
    /// Listening port advertised in Hello, zero when not listening.
    pub port: u16,
    /// Deadline for each handshake step (auth/ack and Hello).
    pub handshake_timeout: Duration,
    /// Emit EIP-8 handshake messages (incoming format is always detected).
    pub eip8: bool,
}

impl ConnectionConfig {
    /// A configuration with the given static key and default timeouts.
    pub fn new(secret_key: B256) -> Self {
        Self {
            secret_key,
            client_id: concat!("ethp2p/v", env!("CARGO_PKG_VERSION")).to_string(),
            capabilities: vec![Capability::eth(66), Capability::eth(67), Capability::eth(68)],
            port: 0,
            handshake_timeout: Duration::from_secs(10),
            eip8: true,
        }
    }

    /// Overrides the advertised client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Overrides the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Overrides the handshake deadline.
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Requests legacy (pre-EIP-8) handshake messages.
    pub const fn with_legacy_handshake(mut self) -> Self {
        self.eip8 = false;
        self
    }

    fn hello(&self, id: PeerId) -> HelloMessage {
        HelloMessage {
            protocol_version: BASE_PROTOCOL_VERSION,
            client_id: self.client_id.clone(),
            capabilities: self.capabilities.clone(),
            port: self.port,
            id,
        }
    }
}

/// A sub-protocol or base-protocol message read off the wire, payload
/// already decompressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The absolute message id.
    pub code: u8,
    /// The RLP payload.
    pub payload: Bytes,
}

/// An authenticated, Hello-negotiated RLPx connection.
///
/// The connection surfaces every inbound message, base protocol included;
/// the caller owns the keepalive and dispatch policy.
#[derive(Debug)]
pub struct Connection<Io> {
    framed: Framed<Io, FrameCodec>,
    state: ConnectionState,
    direction: Direction,
    remote_id: PeerId,
    remote_hello: HelloMessage,
    shared: Vec<SharedCapability>,
    snappy: bool,
}

impl<Io: AsyncRead + AsyncWrite + Unpin> Connection<Io> {
    /// Dials: runs the initiator side of the ECIES handshake and the Hello
    /// exchange.
    pub async fn dial(
        io: Io,
        remote_id: PeerId,
        config: &ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        tokio::time::timeout(config.handshake_timeout, Self::dial_inner(io, remote_id, config))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)?
    }

    async fn dial_inner(
        mut io: Io,
        remote_id: PeerId,
        config: &ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        let mut handshake = Handshake::initiator(config.secret_key, remote_id)?;
        if !config.eip8 {
            handshake = handshake.with_legacy_format();
        }
        let local_id = handshake.local_id();

        let auth = handshake.create_auth();
        io.write_all(&auth).await.map_err(EciesError::from)?;

        read_handshake_message(&mut io, LEGACY_ACK_SIZE, |data, plain| {
            if plain {
                handshake.parse_ack_plain(data)
            } else {
                handshake.parse_ack_eip8(data)
            }
        })
        .await?;

        let framed = Framed::new(io, FrameCodec::new(handshake.secrets()));
        Self::exchange_hello(framed, Direction::Outbound, remote_id, local_id, config).await
    }

    /// Accepts: runs the recipient side of the ECIES handshake and the Hello
    /// exchange. The remote identity is learnt from the auth message.
    pub async fn accept(io: Io, config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        tokio::time::timeout(config.handshake_timeout, Self::accept_inner(io, config))
            .await
            .map_err(|_| ConnectionError::HandshakeTimeout)?
    }

    async fn accept_inner(mut io: Io, config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let mut handshake = Handshake::recipient(config.secret_key)?;
        let local_id = handshake.local_id();

        read_handshake_message(&mut io, LEGACY_AUTH_SIZE, |data, plain| {
            if plain {
                handshake.parse_auth_plain(data)
            } else {
                handshake.parse_auth_eip8(data)
            }
        })
        .await?;

        let ack = handshake.create_ack();
        io.write_all(&ack).await.map_err(EciesError::from)?;

        let remote_id = handshake.remote_id().expect("auth parsed");
        let framed = Framed::new(io, FrameCodec::new(handshake.secrets()));
        Self::exchange_hello(framed, Direction::Inbound, remote_id, local_id, config).await
    }

    async fn exchange_hello(
        mut framed: Framed<Io, FrameCodec>,
        direction: Direction,
        remote_id: PeerId,
        local_id: PeerId,
        config: &ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        // Hello is never compressed
        let hello = P2PMessage::Hello(config.hello(local_id));
        let mut body = BytesMut::new();
        hello.message_id().encode(&mut body);
        hello.encode_payload(&mut body);
        framed.send(body.freeze()).await?;

        let frame = framed.next().await.ok_or(ConnectionError::StreamClosed)??;
        let mut buf = &frame[..];
        let code = u8::decode(&mut buf).map_err(P2PError::from)?;
        let remote_hello = match P2PMessage::decode_payload(code, buf) {
            Ok(P2PMessage::Hello(hello)) => hello,
            Ok(P2PMessage::Disconnect(reason)) => {
                return Err(P2PError::HandshakeDisconnect(reason).into())
            }
            _ => return Err(P2PError::HelloExpected(code).into()),
        };

        if remote_hello.id != remote_id {
            return Err(EciesError::NodeIdMismatch.into());
        }

        let shared = negotiate_capabilities(&config.capabilities, &remote_hello.capabilities)?;
        let snappy = remote_hello.protocol_version >= 5;

        debug!(
            peer = %remote_id,
            client = %remote_hello.client_id,
            caps = ?shared.iter().map(|c| c.capability.to_string()).collect::<Vec<_>>(),
            snappy,
            "RLPx connection established"
        );

        Ok(Self {
            framed,
            state: ConnectionState::Active,
            direction,
            remote_id,
            remote_hello,
            shared,
            snappy,
        })
    }

    /// The remote's node id.
    pub const fn remote_id(&self) -> PeerId {
        self.remote_id
    }

    /// The remote's Hello message.
    pub const fn remote_hello(&self) -> &HelloMessage {
        &self.remote_hello
    }

    /// The negotiated shared capabilities, in offset order.
    pub fn shared_capabilities(&self) -> &[SharedCapability] {
        &self.shared
    }

    /// The connection's lifecycle state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Which side opened the connection.
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Routes an absolute message id to the base protocol or a shared
    /// capability.
    pub fn route(&self, code: u8) -> Result<RoutedCode<'_>, P2PError> {
        route_message_id(&self.shared, code)
    }

    /// Reads the next message. Disconnects and stream closure surface as
    /// errors and move the connection to [`ConnectionState::Closed`].
    pub async fn next_message(&mut self) -> Result<Message, ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::StreamClosed);
        }
        let frame = match self.framed.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                self.state = ConnectionState::Closed;
                return Err(err.into());
            }
            None => {
                self.state = ConnectionState::Closed;
                return Err(ConnectionError::StreamClosed);
            }
        };

        let mut buf = &frame[..];
        let code = u8::decode(&mut buf).map_err(P2PError::from)?;

        if code == P2PMessage::DISCONNECT {
            let payload = self.maybe_decompress(buf)?;
            let reason = match P2PMessage::decode_payload(code, &payload) {
                Ok(P2PMessage::Disconnect(reason)) => reason,
                _ => DisconnectReason::DisconnectRequested,
            };
            self.state = ConnectionState::Closed;
            return Err(ConnectionError::Disconnected(reason));
        }

        let payload = self.maybe_decompress(buf)?;
        Ok(Message { code, payload: payload.into() })
    }

    fn maybe_decompress(&self, payload: &[u8]) -> Result<Vec<u8>, P2PError> {
        if self.snappy && !payload.is_empty() {
            decompress_payload(payload)
        } else {
            Ok(payload.to_vec())
        }
    }

    /// Sends a message with the given absolute id, compressing the payload
    /// when snappy was negotiated.
    pub async fn send(&mut self, code: u8, payload: &[u8]) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::StreamClosed);
        }
        let mut body = BytesMut::new();
        code.encode(&mut body);
        if self.snappy {
            body.extend_from_slice(&compress_payload(payload));
        } else {
            body.extend_from_slice(payload);
        }
        self.framed.send(body.freeze()).await?;
        Ok(())
    }

    /// Sends a keepalive ping.
    pub async fn send_ping(&mut self) -> Result<(), ConnectionError> {
        self.send_p2p(&P2PMessage::Ping).await
    }

    /// Answers a keepalive ping.
    pub async fn send_pong(&mut self) -> Result<(), ConnectionError> {
        self.send_p2p(&P2PMessage::Pong).await
    }

    async fn send_p2p(&mut self, message: &P2PMessage) -> Result<(), ConnectionError> {
        let mut payload = Vec::new();
        message.encode_payload(&mut payload);
        self.send(message.message_id(), &payload).await
    }

    /// Sends a Disconnect with the given reason and closes the connection.
    pub async fn disconnect(&mut self, reason: DisconnectReason) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let result = self.send_p2p(&P2PMessage::Disconnect(reason)).await;
        self.state = ConnectionState::Closed;
        let _ = self.framed.flush().await;
        result
    }

    /// Tears the connection down without notifying the remote.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

/// Reads one handshake message, detecting the legacy plain format by
/// attempting it first at its fixed size, then falling back to the EIP-8
/// size prefix.
async fn read_handshake_message<Io, F>(
    io: &mut Io,
    legacy_size: usize,
    mut parse: F,
) -> Result<(), ConnectionError>
where
    Io: AsyncRead + Unpin,
    F: FnMut(&[u8], bool) -> Result<(), EciesError>,
{
    let mut buf = vec![0u8; legacy_size];
    io.read_exact(&mut buf).await.map_err(EciesError::from)?;

    if parse(&buf, true).is_ok() {
        return Ok(());
    }

    let total = u16::from_be_bytes([buf[0], buf[1]]) as usize + 2;
    if total < legacy_size {
        return Err(EciesError::TagMismatch.into());
    }
    buf.resize(total, 0);
    io.read_exact(&mut buf[legacy_size..]).await.map_err(EciesError::from)?;
    parse(&buf, false).map_err(Into::into)
}

/// Derives the node id of a static secret key.
pub fn node_id(secret_key: B256) -> Result<B512, EciesError> {
    let secret = secp256k1::SecretKey::from_slice(secret_key.as_slice())?;
    Ok(crate::pk2id(&secret.public_key(secp256k1::SECP256K1)))
}
