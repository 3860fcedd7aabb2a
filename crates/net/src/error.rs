//! Engine error taxonomy.

use ethp2p_rlpx::{ConnectionError, DisconnectReason, P2PError};
use ethp2p_wire::{MessageError, StatusError};

/// What went wrong with a single request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestErrorKind {
    /// No response arrived within the deadline.
    Timeout,
    /// The session closed while the request was pending.
    SessionClosed,
    /// The response payload failed to decode.
    Decode,
    /// The request does not exist at the negotiated protocol version.
    UnsupportedVersion,
    /// The session's command channel is gone.
    ChannelClosed,
}

/// A failed request, carrying the request id when one was assigned.
#[derive(Clone, Debug, thiserror::Error)]
#[error("request {request_id:?} failed: {kind:?}")]
pub struct RequestError {
    /// The failure class.
    pub kind: RequestErrorKind,
    /// The wire request id, `None` if the request never made it out.
    pub request_id: Option<u64>,
}

impl RequestError {
    /// A timeout for the given wire request id.
    pub const fn timeout(request_id: u64) -> Self {
        Self { kind: RequestErrorKind::Timeout, request_id: Some(request_id) }
    }

    /// The session closed underneath the request.
    pub const fn session_closed(request_id: Option<u64>) -> Self {
        Self { kind: RequestErrorKind::SessionClosed, request_id }
    }

    /// The command channel to the session task is gone.
    pub const fn channel_closed() -> Self {
        Self { kind: RequestErrorKind::ChannelClosed, request_id: None }
    }
}

/// Fatal session errors; each closes the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport failed or was torn down.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// The peer's STATUS was incompatible.
    #[error(transparent)]
    Status(#[from] StatusError),
    /// A sub-protocol message failed to decode.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// A violation of the multiplexing rules, e.g. a message id outside
    /// every negotiated range.
    #[error(transparent)]
    Protocol(#[from] P2PError),
    /// The peer did not send STATUS in time.
    #[error("STATUS exchange timed out")]
    StatusTimeout,
    /// The peer did not answer a ping in time.
    #[error("ping timed out")]
    PingTimeout,
    /// No eth capability was negotiated on the connection.
    #[error("connection has no eth capability")]
    NoEthCapability,
    /// We disconnected the peer with the given reason.
    #[error("disconnected: {0}")]
    LocalDisconnect(DisconnectReason),
}

impl SessionError {
    /// The Disconnect reason advertised to the peer for this error, `None`
    /// when the transport is already gone.
    pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            Self::Status(_) => Some(DisconnectReason::SubprotocolSpecific),
            Self::Message(_) | Self::Protocol(_) => Some(DisconnectReason::ProtocolBreach),
            Self::StatusTimeout => Some(DisconnectReason::UselessPeer),
            Self::PingTimeout => Some(DisconnectReason::PingTimeout),
            Self::NoEthCapability => Some(DisconnectReason::UselessPeer),
            Self::LocalDisconnect(reason) => Some(*reason),
            // a malformed frame or payload is a protocol breach; transport
            // failures leave nothing to say goodbye over
            Self::Connection(ConnectionError::P2P(_)) => {
                Some(DisconnectReason::ProtocolBreach)
            }
            Self::Connection(_) => None,
        }
    }
}

/// Peer-pool admission failures.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The pool is at its peer limit.
    #[error("peer pool is full")]
    Full,
    /// The remote's client id matched the blocklist.
    #[error("client id is blocklisted: {0}")]
    BlockedClient(String),
    /// The remote is this node.
    #[error("refusing to connect to self")]
    SelfDial,
    /// A session with this node id already exists.
    #[error("peer already connected")]
    AlreadyConnected,
    /// The session handshake failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}
