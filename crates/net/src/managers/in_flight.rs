//! In-flight request correlation and deduplication.

use crate::{
    session::{EthRequest, EthResponse},
    RequestError,
};
use std::{collections::HashMap, time::Duration};
use tokio::sync::oneshot;
use tokio_util::time::{delay_queue, DelayQueue};

/// One pending wire request: its deduplication key, every caller waiting on
/// it, and its deadline entry.
pub struct InFlight {
    /// The request arguments, doubling as the deduplication key.
    pub key: EthRequest,
    /// The callers sharing this wire request.
    pub waiters: Vec<oneshot::Sender<Result<EthResponse, RequestError>>>,
    timeout_key: delay_queue::Key,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("key", &self.key)
            .field("waiters", &self.waiters.len())
            .finish_non_exhaustive()
    }
}

/// Tracks pending requests by id, shares identical requests between
/// callers, and owns their deadlines.
///
/// Ids are handed out from a per-session monotonic counter; every id in the
/// map is strictly below the counter and distinct.
#[derive(Debug, Default)]
pub struct RequestManager {
    next_id: u64,
    in_flight: HashMap<u64, InFlight>,
    by_key: HashMap<EthRequest, u64>,
    timeouts: DelayQueue<u64>,
}

impl RequestManager {
    /// Registers a caller for the given request.
    ///
    /// Returns `Some(id)` when a wire request must be sent; `None` when an
    /// identical request is already in flight and the caller was attached to
    /// it.
    pub fn insert(
        &mut self,
        key: EthRequest,
        waiter: oneshot::Sender<Result<EthResponse, RequestError>>,
        timeout: Duration,
    ) -> Option<u64> {
        if let Some(id) = self.by_key.get(&key) {
            self.in_flight
                .get_mut(id)
                .expect("by_key and in_flight are updated together")
                .waiters
                .push(waiter);
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;

        let timeout_key = self.timeouts.insert(id, timeout);
        self.by_key.insert(key.clone(), id);
        self.in_flight.insert(id, InFlight { key, waiters: vec![waiter], timeout_key });
        Some(id)
    }

    /// Completes the request with the given id, fanning the result out to
    /// every waiter. Returns `false` if the id was unknown.
    pub fn complete(&mut self, id: u64, result: Result<EthResponse, RequestError>) -> bool {
        let Some(in_flight) = self.in_flight.remove(&id) else {
            return false;
        };
        self.by_key.remove(&in_flight.key);
        self.timeouts.remove(&in_flight.timeout_key);
        for waiter in in_flight.waiters {
            let _ = waiter.send(result.clone());
        }
        true
    }

    /// Expires the request whose deadline fired, rejecting its waiters.
    pub fn expire(&mut self, id: u64) {
        let Some(in_flight) = self.in_flight.remove(&id) else {
            return;
        };
        self.by_key.remove(&in_flight.key);
        for waiter in in_flight.waiters {
            let _ = waiter.send(Err(RequestError::timeout(id)));
        }
    }

    /// Rejects every pending request with a session-closed error and clears
    /// all timers.
    pub fn close_all(&mut self) {
        self.by_key.clear();
        self.timeouts.clear();
        for (id, in_flight) in self.in_flight.drain() {
            for waiter in in_flight.waiters {
                let _ = waiter.send(Err(RequestError::session_closed(Some(id))));
            }
        }
    }

    /// Polls the deadline queue; resolves to an expired request id.
    ///
    /// Pends while no deadline is due, including on an empty queue, which
    /// makes it safe to poll from a `select!` loop whose other branches
    /// insert new deadlines.
    pub async fn next_timeout(&mut self) -> u64 {
        futures::future::poll_fn(|cx| match self.timeouts.poll_expired(cx) {
            std::task::Poll::Ready(Some(expired)) => std::task::Poll::Ready(expired.into_inner()),
            _ => std::task::Poll::Pending,
        })
        .await
    }

    /// True while any deadline is pending.
    pub fn has_deadlines(&self) -> bool {
        !self.timeouts.is_empty()
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// The next id that will be handed out.
    pub const fn next_id(&self) -> u64 {
        self.next_id
    }

    /// The message id of the response the pending request `id` expects,
    /// `None` for unknown ids.
    pub fn expected_response(&self, id: u64) -> Option<ethp2p_wire::EthMessageId> {
        self.in_flight.get(&id).map(|in_flight| in_flight.key.response_id())
    }

    /// The ids currently in flight.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.in_flight.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EthRequest;
    use alloy_primitives::B256;
    use assert_matches::assert_matches;
    use ethp2p_wire::{BlockHashOrNumber, GetBlockHeaders};

    fn headers_request(start: u64) -> EthRequest {
        EthRequest::BlockHeaders(GetBlockHeaders {
            start_block: BlockHashOrNumber::Number(start),
            limit: 10,
            skip: 0,
            reverse: false,
        })
    }

    #[tokio::test]
    async fn ids_are_distinct_and_below_counter() {
        let mut manager = RequestManager::default();
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for start in 0..10 {
            let (tx, rx) = oneshot::channel();
            ids.push(manager.insert(headers_request(start), tx, Duration::from_secs(8)).unwrap());
            receivers.push(rx);
        }

        let mut seen = std::collections::HashSet::new();
        for id in manager.ids() {
            assert!(id < manager.next_id());
            assert!(seen.insert(id));
        }
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn identical_requests_share_one_wire_request() {
        let mut manager = RequestManager::default();

        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        let id = manager.insert(headers_request(100), tx_a, Duration::from_secs(8)).unwrap();
        // second identical request coalesces
        assert_eq!(manager.insert(headers_request(100), tx_b, Duration::from_secs(8)), None);
        assert_eq!(manager.len(), 1);

        assert!(manager.complete(id, Ok(EthResponse::BlockHeaders(vec![]))));
        assert_matches!(rx_a.await.unwrap(), Ok(EthResponse::BlockHeaders(_)));
        assert_matches!(rx_b.await.unwrap(), Ok(EthResponse::BlockHeaders(_)));

        // the key is free again afterwards
        let (tx_c, _rx_c) = oneshot::channel();
        assert!(manager.insert(headers_request(100), tx_c, Duration::from_secs(8)).is_some());
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let mut manager = RequestManager::default();
        assert!(!manager.complete(42, Ok(EthResponse::BlockHeaders(vec![]))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadlines_reject_with_timeout() {
        let mut manager = RequestManager::default();
        let (tx, rx) = oneshot::channel();
        let id = manager.insert(headers_request(7), tx, Duration::from_secs(8)).unwrap();

        let expired = manager.next_timeout().await;
        assert_eq!(expired, id);
        manager.expire(id);

        assert_matches!(
            rx.await.unwrap(),
            Err(RequestError { kind: crate::RequestErrorKind::Timeout, request_id: Some(i) }) if i == id
        );
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_response_cancels_the_deadline() {
        let mut manager = RequestManager::default();
        let (tx, rx) = oneshot::channel();
        let id = manager.insert(headers_request(7), tx, Duration::from_secs(8)).unwrap();

        manager.complete(id, Ok(EthResponse::BlockHeaders(vec![])));
        assert!(!manager.has_deadlines());
        assert_matches!(rx.await.unwrap(), Ok(_));
    }

    #[tokio::test]
    async fn close_rejects_everything_once() {
        let mut manager = RequestManager::default();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        manager.insert(headers_request(1), tx_a, Duration::from_secs(8)).unwrap();
        manager.insert(headers_request(2), tx_b, Duration::from_secs(8)).unwrap();

        manager.close_all();
        assert!(manager.is_empty());
        assert!(!manager.has_deadlines());

        assert_matches!(
            rx_a.await.unwrap(),
            Err(RequestError { kind: crate::RequestErrorKind::SessionClosed, .. })
        );
        assert_matches!(
            rx_b.await.unwrap(),
            Err(RequestError { kind: crate::RequestErrorKind::SessionClosed, .. })
        );
    }
}
