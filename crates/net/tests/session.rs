//! End-to-end session behaviour over in-memory connections.

mod common;

use assert_matches::assert_matches;
use common::{fixture, rlpx_pair, MockChainConfig, ETH_OFFSET};
use ethp2p_consensus::Header;
use ethp2p_net::{
    EthSession, RequestError, RequestErrorKind, SessionConfig, SessionError, SessionEvent,
};
use ethp2p_rlpx::Message;
use ethp2p_wire::{
    BlockHashOrNumber, EthMessage, EthMessageId, EthVersion, GetBlockHeaders, RequestPair,
    StatusError,
};
use alloy_primitives::B256;
use alloy_rlp::Decodable as _;
use std::{sync::Arc, time::Duration};

fn headers_request(start: u64, limit: u64) -> GetBlockHeaders {
    GetBlockHeaders {
        start_block: BlockHashOrNumber::Number(start),
        limit,
        skip: 0,
        reverse: false,
    }
}

/// Both sides run real sessions over one duplex; requests are served from
/// the mock chain.
#[tokio::test]
async fn request_roundtrip_between_sessions() {
    let fixture_a = fixture(32);
    let fixture_b = fixture(32);
    let (conn_a, conn_b) = rlpx_pair(0x11, 0x22).await;

    let (session_a, session_b) = tokio::join!(
        EthSession::start(conn_a, fixture_a.ctx.clone(), SessionConfig::default()),
        EthSession::start(conn_b, fixture_b.ctx.clone(), SessionConfig::default()),
    );
    let (session_a, _session_b) = (session_a.unwrap(), session_b.unwrap());

    assert_eq!(session_a.version(), EthVersion::Eth68);
    assert_eq!(session_a.peer_status().chain, 1);

    let headers = session_a.get_block_headers(headers_request(10, 5)).await.unwrap();
    assert_eq!(headers.len(), 5);
    assert_eq!(headers[0].number, 10);
    assert_eq!(headers[4].number, 14);

    let hashes = vec![fixture_b.chain.headers[3].hash_slow()];
    let bodies = session_a.get_block_bodies(hashes).await.unwrap();
    assert_eq!(bodies.len(), 1);

    let receipts = session_a.get_receipts(vec![B256::repeat_byte(9)]).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].is_empty());
}

/// A peer with a different genesis is rejected within the handshake and the
/// session never enters the pool's world.
#[tokio::test]
async fn status_genesis_mismatch_closes() {
    let fixture_a = fixture(8);
    let mut fixture_b = fixture(8);
    // poison B's view of the genesis
    fixture_b.ctx.chain_config = Arc::new(MockChainConfig {
        chain_id: 1,
        genesis_hash: B256::repeat_byte(0xde),
    });
    let bad_genesis = {
        let mut chain = common::MockChain::new(8);
        chain.headers[0].extra_data = alloy_primitives::Bytes::from(vec![0xff]);
        chain
    };
    fixture_b.ctx.chain = Arc::new(bad_genesis);

    let (conn_a, conn_b) = rlpx_pair(0x31, 0x32).await;
    let (session_a, session_b) = tokio::join!(
        EthSession::start(conn_a, fixture_a.ctx.clone(), SessionConfig::default()),
        EthSession::start(conn_b, fixture_b.ctx.clone(), SessionConfig::default()),
    );

    assert_matches!(
        session_a,
        Err(SessionError::Status(StatusError::GenesisMismatch { .. }))
    );
    // B either observes its own mismatch or A's disconnect
    assert!(session_b.is_err());
}

/// Responses arriving out of issue order resolve the matching requests:
/// correlation is by request id alone.
#[tokio::test]
async fn out_of_order_responses_correlate() {
    let fixture_a = fixture(64);
    let (conn_a, mut peer) = rlpx_pair(0x41, 0x42).await;

    let session_task = EthSession::start(conn_a, fixture_a.ctx.clone(), SessionConfig::default());

    // drive the scripted peer by hand: answer the STATUS, then respond to
    // two header requests in reverse order
    let peer_task = async move {
        // forward our status verbatim, which is trivially compatible
        let Message { code, payload } = peer.next_message().await.unwrap();
        assert_eq!(code, ETH_OFFSET + EthMessageId::Status as u8);
        peer.send(code, &payload).await.unwrap();

        let mut pending = Vec::new();
        for _ in 0..2 {
            let Message { code, payload } = peer.next_message().await.unwrap();
            assert_eq!(code, ETH_OFFSET + EthMessageId::GetBlockHeaders as u8);
            let request =
                RequestPair::<GetBlockHeaders>::decode(&mut &payload[..]).unwrap();
            pending.push(request);
        }

        // respond newest-first
        pending.reverse();
        for request in pending {
            let start = match request.message.start_block {
                BlockHashOrNumber::Number(number) => number,
                BlockHashOrNumber::Hash(_) => unreachable!("requests use numbers"),
            };
            let response = EthMessage::BlockHeaders(RequestPair {
                request_id: request.request_id,
                message: vec![Header { number: start, ..Default::default() }],
            });
            let mut payload = Vec::new();
            response.encode_payload(&mut payload);
            peer.send(ETH_OFFSET + EthMessageId::BlockHeaders as u8, &payload)
                .await
                .unwrap();
        }
        peer
    };

    // the peer must run concurrently with both the handshake and the
    // requests, so it lives on its own task
    let peer_handle = tokio::spawn(peer_task);
    let session = session_task.await.unwrap();

    let (first, second) = tokio::join!(
        session.get_block_headers(headers_request(5, 1)),
        session.get_block_headers(headers_request(6, 1)),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first[0].number, 5);
    assert_eq!(second[0].number, 6);

    let _peer = peer_handle.await.unwrap();
}

/// Two callers asking for the same thing share one wire request.
#[tokio::test]
async fn identical_requests_deduplicate() {
    let fixture_a = fixture(64);
    let (conn_a, mut peer) = rlpx_pair(0x51, 0x52).await;

    let session_task = EthSession::start(conn_a, fixture_a.ctx.clone(), SessionConfig::default());

    let peer_task = async move {
        let Message { code, payload } = peer.next_message().await.unwrap();
        peer.send(code, &payload).await.unwrap(); // echo status

        // exactly one header request reaches the wire
        let Message { code, payload } = peer.next_message().await.unwrap();
        assert_eq!(code, ETH_OFFSET + EthMessageId::GetBlockHeaders as u8);
        let request = RequestPair::<GetBlockHeaders>::decode(&mut &payload[..]).unwrap();

        let response = EthMessage::BlockHeaders(RequestPair {
            request_id: request.request_id,
            message: vec![Header { number: 100, ..Default::default() }],
        });
        let mut out = Vec::new();
        response.encode_payload(&mut out);
        peer.send(ETH_OFFSET + EthMessageId::BlockHeaders as u8, &out).await.unwrap();

        // any further header request would be a dedup failure
        tokio::select! {
            message = peer.next_message() => {
                if let Ok(Message { code, .. }) = message {
                    assert_ne!(
                        code,
                        ETH_OFFSET + EthMessageId::GetBlockHeaders as u8,
                        "duplicate wire request observed"
                    );
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {}
        }
        peer
    };

    let peer_handle = tokio::spawn(peer_task);
    let session_handle = session_task.await.unwrap();

    let request = headers_request(100, 10);
    let (a, b) = tokio::join!(
        session_handle.get_block_headers(request),
        session_handle.get_block_headers(request),
    );
    assert_eq!(a.unwrap(), b.unwrap());

    let _peer = peer_handle.await.unwrap();
}

/// A request with no response rejects at the deadline; the session survives.
#[tokio::test]
async fn request_timeout_rejects_but_session_survives() {
    let fixture_a = fixture(8);
    let (conn_a, mut peer) = rlpx_pair(0x61, 0x62).await;

    let config = SessionConfig::default().with_request_timeout(Duration::from_millis(100));
    let session_task = EthSession::start(conn_a, fixture_a.ctx.clone(), config);

    let peer_task = async move {
        let Message { code, payload } = peer.next_message().await.unwrap();
        peer.send(code, &payload).await.unwrap(); // echo status
        // swallow the request without answering
        let _ = peer.next_message().await;
        // stay alive long enough for the session to outlive the timeout
        tokio::time::sleep(Duration::from_millis(400)).await;
        peer
    };

    let peer_handle = tokio::spawn(peer_task);
    let session = session_task.await.unwrap();

    let err = session.get_block_headers(headers_request(1, 1)).await.unwrap_err();
    assert_matches!(err, RequestError { kind: RequestErrorKind::Timeout, request_id: Some(_) });

    // the session is still usable for announcements
    assert!(!session.is_closed());
    let _ = peer_handle.await;
}

/// Announcements route to the collaborators registered with the session.
#[tokio::test]
async fn announcements_reach_collaborators() {
    let fixture_a = fixture(16);
    let fixture_b = fixture(16);
    let (conn_a, conn_b) = rlpx_pair(0x71, 0x72).await;

    let (session_a, session_b) = tokio::join!(
        EthSession::start(conn_a, fixture_a.ctx.clone(), SessionConfig::default()),
        EthSession::start(conn_b, fixture_b.ctx.clone(), SessionConfig::default()),
    );
    let (session_a, session_b) = (session_a.unwrap(), session_b.unwrap());
    let mut events_b = session_b.subscribe();

    // hash announcement in the eth/68 shape
    session_a.announce_tx_hashes(vec![(0x02, 120, B256::repeat_byte(0x0a))]);

    loop {
        match events_b.recv().await.unwrap() {
            SessionEvent::Message { id: EthMessageId::NewPooledTransactionHashes, .. } => break,
            SessionEvent::Closed { .. } => panic!("session closed unexpectedly"),
            _ => {}
        }
    }
    let announced = fixture_b.txpool.announced_hashes.lock().clone();
    assert_eq!(announced.len(), 1);
    assert_eq!(announced[0].0, 1);
    assert_eq!(announced[0].1, session_b.peer_id());

    // empty transaction broadcast still dispatches
    session_a.announce_transactions(Vec::new());
    loop {
        match events_b.recv().await.unwrap() {
            SessionEvent::Message { id: EthMessageId::Transactions, .. } => break,
            SessionEvent::Closed { .. } => panic!("session closed unexpectedly"),
            _ => {}
        }
    }
    assert_eq!(fixture_b.txpool.announced_txs.lock().len(), 1);
}

/// A response with an unknown request id is surfaced but not fatal.
#[tokio::test]
async fn unexpected_response_is_not_fatal() {
    let fixture_a = fixture(8);
    let (conn_a, mut peer) = rlpx_pair(0x81, 0x82).await;

    let session_task = EthSession::start(conn_a, fixture_a.ctx.clone(), SessionConfig::default());
    let peer_task = async move {
        let Message { code, payload } = peer.next_message().await.unwrap();
        peer.send(code, &payload).await.unwrap();

        // a response nobody asked for
        let stray = EthMessage::BlockHeaders(RequestPair { request_id: 999, message: vec![] });
        let mut out = Vec::new();
        stray.encode_payload(&mut out);
        peer.send(ETH_OFFSET + EthMessageId::BlockHeaders as u8, &out).await.unwrap();
        peer
    };

    let (session, _peer) = tokio::join!(session_task, peer_task);
    let session = session.unwrap();
    let mut events = session.subscribe();

    loop {
        match events.recv().await.unwrap() {
            SessionEvent::UnexpectedResponse { request_id: 999, .. } => break,
            SessionEvent::Closed { .. } => panic!("stray response must not close the session"),
            _ => {}
        }
    }
    assert!(!session.is_closed());
}
