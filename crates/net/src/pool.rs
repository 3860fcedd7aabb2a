//! The bounded peer pool: admission, session ownership, teardown.

use crate::{
    EthSession, PeerId, PoolError, SessionConfig, SessionContext, SessionEvent, SessionHandle,
};
use ethp2p_rlpx::{Connection, DisconnectReason};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};

/// Admission policy of the pool.
#[derive(Clone, Debug)]
pub struct PeerPoolConfig {
    /// Ceiling on concurrently held sessions.
    pub max_peers: usize,
    /// Reject peers whose advertised client id contains one of these
    /// substrings.
    pub client_filter: Vec<String>,
    /// Our own node id; inbound connections claiming it are rejected.
    pub local_id: PeerId,
}

impl PeerPoolConfig {
    /// A policy with the given limit and self id and no client filter.
    pub const fn new(max_peers: usize, local_id: PeerId) -> Self {
        Self { max_peers, client_filter: Vec::new(), local_id }
    }

    /// Adds client-id substrings to reject.
    pub fn with_client_filter(mut self, filter: Vec<String>) -> Self {
        self.client_filter = filter;
        self
    }
}

/// Owns every active ETH session.
///
/// Admission happens on [`PeerPool::add_connection`]; once admitted, the
/// pool holds the session for its lifetime and removes it when the session's
/// `Closed` event fires. Closing a session cancels its pending requests with
/// a session-closed error inside the session task.
pub struct PeerPool {
    config: PeerPoolConfig,
    ctx: SessionContext,
    session_config: SessionConfig,
    peers: Arc<RwLock<HashMap<PeerId, SessionHandle>>>,
    on_closed: Option<Arc<dyn Fn(PeerId) + Send + Sync>>,
}

impl std::fmt::Debug for PeerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerPool")
            .field("config", &self.config)
            .field("peers", &self.len())
            .finish_non_exhaustive()
    }
}

impl PeerPool {
    /// A pool admitting sessions against the shared collaborators.
    pub fn new(config: PeerPoolConfig, ctx: SessionContext, session_config: SessionConfig) -> Self {
        Self {
            config,
            ctx,
            session_config,
            peers: Arc::new(RwLock::new(HashMap::new())),
            on_closed: None,
        }
    }

    /// Installs a hook invoked when a session leaves the pool, e.g. to
    /// return a listener slot.
    pub fn with_closed_hook(mut self, hook: impl Fn(PeerId) + Send + Sync + 'static) -> Self {
        self.on_closed = Some(Arc::new(hook));
        self
    }

    /// Applies the admission policy and, on success, runs the ETH handshake
    /// and takes ownership of the session.
    pub async fn add_connection<Io>(&self, mut conn: Connection<Io>) -> Result<SessionHandle, PoolError>
    where
        Io: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer_id = conn.remote_id();

        if peer_id == self.config.local_id {
            let _ = conn.disconnect(DisconnectReason::ConnectedToSelf).await;
            return Err(PoolError::SelfDial);
        }

        let client_id = conn.remote_hello().client_id.clone();
        if let Some(blocked) =
            self.config.client_filter.iter().find(|needle| client_id.contains(needle.as_str()))
        {
            let blocked = blocked.clone();
            let _ = conn.disconnect(DisconnectReason::UselessPeer).await;
            return Err(PoolError::BlockedClient(blocked));
        }

        {
            let peers = self.peers.read();
            if peers.len() >= self.config.max_peers {
                drop(peers);
                let _ = conn.disconnect(DisconnectReason::TooManyPeers).await;
                return Err(PoolError::Full);
            }
            if peers.contains_key(&peer_id) {
                drop(peers);
                let _ = conn.disconnect(DisconnectReason::AlreadyConnected).await;
                return Err(PoolError::AlreadyConnected);
            }
        }

        let handle =
            EthSession::start(conn, self.ctx.clone(), self.session_config).await?;

        self.peers.write().insert(peer_id, handle.clone());
        debug!(peer = %peer_id, peers = self.len(), "peer admitted");

        // watch for the session's close and drop it from the set
        let peers = self.peers.clone();
        let on_closed = self.on_closed.clone();
        let mut events = handle.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Closed { .. }) | Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
            peers.write().remove(&peer_id);
            if let Some(hook) = on_closed {
                hook(peer_id);
            }
            debug!(peer = %peer_id, "peer removed from pool");
        });

        Ok(handle)
    }

    /// The session of a connected peer.
    pub fn get(&self, peer_id: &PeerId) -> Option<SessionHandle> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Ids of every connected peer.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.read().keys().copied().collect()
    }

    /// Handles of every connected peer.
    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.peers.read().values().cloned().collect()
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// True when no peer is connected.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Disconnects every peer with the given reason.
    pub fn disconnect_all(&self, reason: DisconnectReason) {
        for handle in self.sessions() {
            handle.disconnect(reason);
        }
    }
}
