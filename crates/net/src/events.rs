//! Typed session events.
//!
//! Each session owns one bounded broadcast channel; subscribers register
//! through [`SessionHandle::subscribe`](crate::SessionHandle::subscribe)
//! rather than string-keyed callbacks.

use ethp2p_rlpx::DisconnectReason;
use ethp2p_wire::{EthMessageId, Status};

/// Events a session emits over its lifetime. After `Closed`, nothing more
/// follows.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// The STATUS exchange completed and the session is live.
    Connected {
        /// The peer's STATUS snapshot.
        status: Status,
    },
    /// An inbound sub-protocol message was dispatched.
    Message {
        /// The message id.
        id: EthMessageId,
        /// The request id, for correlated messages.
        request_id: Option<u64>,
    },
    /// A response arrived that matched no pending request.
    UnexpectedResponse {
        /// The message id of the response.
        id: EthMessageId,
        /// The unmatched request id.
        request_id: u64,
    },
    /// A non-fatal error was swallowed by the dispatcher.
    Error(String),
    /// The session closed; the final event.
    Closed {
        /// The disconnect reason, if one was exchanged.
        reason: Option<DisconnectReason>,
        /// True if this side initiated the teardown.
        initiated_by_us: bool,
    },
}
