//! Outbound connection establishment.

use crate::PeerId;
use ethp2p_rlpx::{Connection, ConnectionConfig, ConnectionError};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Dials remote nodes and runs the initiator handshake.
#[derive(Clone, Debug)]
pub struct Dialer {
    config: ConnectionConfig,
}

impl Dialer {
    /// A dialer stamping every connection with the given configuration.
    pub const fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// The connection configuration in use.
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens a TCP connection to `addr` and authenticates it against the
    /// known `remote_id`.
    pub async fn dial(
        &self,
        addr: SocketAddr,
        remote_id: PeerId,
    ) -> Result<Connection<TcpStream>, ConnectionError> {
        trace!(%addr, peer = %remote_id, "dialing");
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        Connection::dial(socket, remote_id, &self.config).await
    }
}
