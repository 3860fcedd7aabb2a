//! Inbound connection acceptance with watermark-controlled backpressure.

use ethp2p_rlpx::{Connection, ConnectionConfig};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, Notify},
};

/// Listener limits and watermarks.
#[derive(Clone, Copy, Debug)]
pub struct ListenerConfig {
    /// Hard ceiling on concurrently tracked inbound connections; sockets
    /// beyond it are dropped on accept.
    pub max_connections: usize,
    /// Stop accepting (close the server socket) once this many connections
    /// are tracked. Defaults to `max_connections`.
    pub close_above: usize,
    /// Reopen the server socket once the tracked count falls back to this.
    pub listen_below: usize,
}

impl ListenerConfig {
    /// Limits with both watermarks at the ceiling.
    pub const fn new(max_connections: usize) -> Self {
        Self { max_connections, close_above: max_connections, listen_below: max_connections }
    }

    /// Sets the close/reopen watermarks.
    pub const fn with_watermarks(mut self, close_above: usize, listen_below: usize) -> Self {
        self.close_above = close_above;
        self.listen_below = listen_below;
        self
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(50)
    }
}

/// Accepts sockets, runs the recipient handshake on each, and yields
/// authenticated connections.
///
/// Every yielded connection occupies a slot until [`Listener::release`] (or
/// the [`SlotHandle`] the pool holds) gives it back; at the `close_above`
/// watermark the server socket is closed and reopened only when the count
/// drops to `listen_below`.
#[derive(Debug)]
pub struct Listener {
    incoming: mpsc::Receiver<Connection<TcpStream>>,
    local_addr: SocketAddr,
    slots: Arc<Slots>,
}

#[derive(Debug)]
struct Slots {
    active: AtomicUsize,
    freed: Notify,
}

/// A cloneable handle for returning connection slots to the listener.
#[derive(Clone, Debug)]
pub struct SlotHandle {
    slots: Arc<Slots>,
}

impl SlotHandle {
    /// Returns one slot.
    pub fn release(&self) {
        self.slots.active.fetch_sub(1, Ordering::SeqCst);
        self.slots.freed.notify_waiters();
    }
}

impl Listener {
    /// Binds on `addr` and starts the accept task.
    pub async fn bind(
        addr: SocketAddr,
        config: ListenerConfig,
        conn_config: ConnectionConfig,
    ) -> std::io::Result<Self> {
        let socket = TcpListener::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        let slots = Arc::new(Slots { active: AtomicUsize::new(0), freed: Notify::new() });
        let (tx, incoming) = mpsc::channel(8);

        tokio::spawn(accept_loop(socket, local_addr, config, conn_config, slots.clone(), tx));

        Ok(Self { incoming, local_addr, slots })
    }

    /// The bound address.
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The next authenticated inbound connection; `None` once the accept
    /// task is gone.
    pub async fn accept(&mut self) -> Option<Connection<TcpStream>> {
        self.incoming.recv().await
    }

    /// Number of currently tracked connections.
    pub fn active(&self) -> usize {
        self.slots.active.load(Ordering::SeqCst)
    }

    /// A handle for returning slots when connections die.
    pub fn slot_handle(&self) -> SlotHandle {
        SlotHandle { slots: self.slots.clone() }
    }

    /// Returns one slot.
    pub fn release(&self) {
        self.slot_handle().release()
    }
}

async fn accept_loop(
    socket: TcpListener,
    local_addr: SocketAddr,
    config: ListenerConfig,
    conn_config: ConnectionConfig,
    slots: Arc<Slots>,
    tx: mpsc::Sender<Connection<TcpStream>>,
) {
    let mut socket = Some(socket);

    loop {
        // watermark: close the server while saturated, reopen when drained
        if slots.active.load(Ordering::SeqCst) >= config.close_above {
            drop(socket.take());
            debug!(%local_addr, "listener saturated, closing server socket");
            while slots.active.load(Ordering::SeqCst) > config.listen_below {
                slots.freed.notified().await;
            }
            match TcpListener::bind(local_addr).await {
                Ok(reopened) => {
                    debug!(%local_addr, "listener reopened");
                    socket = Some(reopened);
                }
                Err(err) => {
                    error!(%local_addr, %err, "failed to reopen listener");
                    return;
                }
            }
        }

        let listener = socket.as_ref().expect("socket present outside the saturated window");
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };

        if slots.active.load(Ordering::SeqCst) >= config.max_connections {
            trace!(%remote_addr, "at max connections, dropping socket");
            continue;
        }
        slots.active.fetch_add(1, Ordering::SeqCst);

        let conn_config = conn_config.clone();
        let slots = slots.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = stream.set_nodelay(true);
            match Connection::accept(stream, &conn_config).await {
                Ok(conn) => {
                    if tx.send(conn).await.is_err() {
                        slots.active.fetch_sub(1, Ordering::SeqCst);
                        slots.freed.notify_waiters();
                    }
                }
                Err(err) => {
                    trace!(%remote_addr, %err, "inbound handshake failed");
                    slots.active.fetch_sub(1, Ordering::SeqCst);
                    slots.freed.notify_waiters();
                }
            }
        });
    }
}
