//! Peer-pool admission and teardown.

mod common;

use assert_matches::assert_matches;
use common::{fixture, rlpx_pair};
use ethp2p_net::{
    EthSession, PeerPool, PeerPoolConfig, PoolError, SessionConfig,
};
use ethp2p_rlpx::{node_id, DisconnectReason};
use alloy_primitives::B256;
use ethp2p_net::PeerId;
use std::time::Duration;

fn pool(max_peers: usize, local_id: PeerId) -> (PeerPool, common::Fixture) {
    let fixture = fixture(16);
    let pool = PeerPool::new(
        PeerPoolConfig::new(max_peers, local_id),
        fixture.ctx.clone(),
        SessionConfig::default(),
    );
    (pool, fixture)
}

#[tokio::test]
async fn admits_and_serves_until_full() {
    let (pool, _fixture) = pool(1, PeerId::repeat_byte(0xff));

    // first peer: admitted
    let peer_fixture = fixture(16);
    let (conn_a, conn_b) = rlpx_pair(0x01, 0x02).await;
    let peer_session = tokio::spawn(EthSession::start(
        conn_b,
        peer_fixture.ctx.clone(),
        SessionConfig::default(),
    ));
    let handle = pool.add_connection(conn_a).await.unwrap();
    assert_eq!(pool.len(), 1);
    assert!(pool.get(&handle.peer_id()).is_some());
    // keep the remote's handle alive so the session stays in the pool
    let _peer_handle = peer_session.await.unwrap().unwrap();

    // second peer: the pool is full before any ETH handshake happens
    let (conn_c, mut conn_d) = rlpx_pair(0x03, 0x04).await;
    let observer = tokio::spawn(async move { conn_d.next_message().await });
    assert_matches!(pool.add_connection(conn_c).await, Err(PoolError::Full));
    // the rejected side observes Disconnect(TooManyPeers)
    let observed = observer.await.unwrap();
    assert_matches!(
        observed,
        Err(ethp2p_rlpx::ConnectionError::Disconnected(DisconnectReason::TooManyPeers))
    );
}

#[tokio::test]
async fn rejects_self_dial() {
    // pool configured with B's identity, so the inbound "peer" is ourselves
    let local_id = node_id(B256::repeat_byte(0x06)).unwrap();
    let (pool, _fixture) = pool(8, local_id);

    let (conn_a, _conn_b) = rlpx_pair(0x05, 0x06).await;
    assert_matches!(pool.add_connection(conn_a).await, Err(PoolError::SelfDial));
    assert!(pool.is_empty());
}

#[tokio::test]
async fn rejects_blocklisted_clients() {
    let fixture = fixture(16);
    let pool = PeerPool::new(
        PeerPoolConfig::new(8, PeerId::repeat_byte(0xff))
            .with_client_filter(vec!["ethp2p".to_string()]),
        fixture.ctx.clone(),
        SessionConfig::default(),
    );

    let (conn_a, _conn_b) = rlpx_pair(0x07, 0x08).await;
    // every test connection advertises the default ethp2p client id
    assert_matches!(pool.add_connection(conn_a).await, Err(PoolError::BlockedClient(_)));
    assert!(pool.is_empty());
}

#[tokio::test]
async fn closed_sessions_leave_the_pool() {
    let (pool, _fixture) = pool(4, PeerId::repeat_byte(0xff));

    let peer_fixture = fixture(16);
    let (conn_a, conn_b) = rlpx_pair(0x09, 0x0a).await;
    let peer_session = tokio::spawn(EthSession::start(
        conn_b,
        peer_fixture.ctx.clone(),
        SessionConfig::default(),
    ));
    let handle = pool.add_connection(conn_a).await.unwrap();
    let peer_handle = peer_session.await.unwrap().unwrap();
    assert_eq!(pool.len(), 1);

    // the remote disconnects; our session closes and leaves the pool
    peer_handle.disconnect(DisconnectReason::ClientQuitting);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !pool.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "session was not removed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(handle.is_closed());
}
