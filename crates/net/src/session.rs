//! The per-connection ETH session: STATUS handshake, the service loop, and
//! the request interface handed to callers.

use crate::{
    handlers,
    managers::RequestManager,
    PeerId, RequestError, SessionConfig, SessionContext, SessionError, SessionEvent,
};
use alloy_primitives::{Bytes, B256, U256};
use ethp2p_consensus::{Block, BlockBody, Header, PooledTransaction, ReceiptEnvelope, TxEnvelope};
use ethp2p_rlpx::{
    Connection, ConnectionError, DisconnectReason, Message, P2PMessage, RoutedCode,
};
use ethp2p_wire::{
    EthMessage, EthMessageId, EthVersion, GetBlockBodies, GetBlockHeaders, GetNodeData,
    GetPooledTransactions, GetReceipts, Head, NewBlock, NewBlockHashes,
    NewPooledTransactionHashes, NewPooledTransactionHashes66, NewPooledTransactionHashes68,
    RequestPair, Status, StatusError, Transactions,
};
use std::time::Instant;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast, mpsc, oneshot},
};

/// Capacity of a session's event channel; slow subscribers lose the oldest
/// events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The argument set of an outbound request. Doubles as the deduplication
/// key: two calls with equal arguments share one wire request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EthRequest {
    /// `GetBlockHeaders` arguments.
    BlockHeaders(GetBlockHeaders),
    /// `GetBlockBodies` hashes.
    BlockBodies(Vec<B256>),
    /// `GetPooledTransactions` hashes.
    PooledTransactions(Vec<B256>),
    /// `GetNodeData` hashes, eth/66 and older.
    NodeData(Vec<B256>),
    /// `GetReceipts` hashes.
    Receipts(Vec<B256>),
}

impl EthRequest {
    /// The wire message for this request under the given id.
    fn into_message(self, request_id: u64) -> EthMessage {
        match self {
            Self::BlockHeaders(message) => {
                EthMessage::GetBlockHeaders(RequestPair { request_id, message })
            }
            Self::BlockBodies(hashes) => EthMessage::GetBlockBodies(RequestPair {
                request_id,
                message: GetBlockBodies(hashes),
            }),
            Self::PooledTransactions(hashes) => EthMessage::GetPooledTransactions(RequestPair {
                request_id,
                message: GetPooledTransactions(hashes),
            }),
            Self::NodeData(hashes) => {
                EthMessage::GetNodeData(RequestPair { request_id, message: GetNodeData(hashes) })
            }
            Self::Receipts(hashes) => {
                EthMessage::GetReceipts(RequestPair { request_id, message: GetReceipts(hashes) })
            }
        }
    }

    /// The message id of the response answering this request.
    pub(crate) const fn response_id(&self) -> EthMessageId {
        match self {
            Self::BlockHeaders(_) => EthMessageId::BlockHeaders,
            Self::BlockBodies(_) => EthMessageId::BlockBodies,
            Self::PooledTransactions(_) => EthMessageId::PooledTransactions,
            Self::NodeData(_) => EthMessageId::NodeData,
            Self::Receipts(_) => EthMessageId::Receipts,
        }
    }
}

/// A decoded response payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EthResponse {
    /// Headers answering `GetBlockHeaders`.
    BlockHeaders(Vec<Header>),
    /// Bodies answering `GetBlockBodies`.
    BlockBodies(Vec<BlockBody>),
    /// Transactions answering `GetPooledTransactions`.
    PooledTransactions(Vec<PooledTransaction>),
    /// Trie nodes answering `GetNodeData`.
    NodeData(Vec<Bytes>),
    /// Receipt lists answering `GetReceipts`.
    Receipts(Vec<Vec<ReceiptEnvelope>>),
}

/// A routed message id with the capability borrow already released.
enum Route {
    Base(u8),
    Eth(u8),
}

enum SessionCommand {
    Request {
        request: EthRequest,
        tx: oneshot::Sender<Result<EthResponse, RequestError>>,
    },
    Announce(EthMessage),
    Disconnect(DisconnectReason),
}

/// The caller-facing half of a session.
///
/// Requests resolve on the session's inbound path; announcements are
/// fire-and-forget. Cloning is cheap, every clone addresses the same
/// session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    peer_id: PeerId,
    client_id: String,
    version: EthVersion,
    peer_status: Status,
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// The remote's node id.
    pub const fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The remote's advertised client id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The negotiated ETH version.
    pub const fn version(&self) -> EthVersion {
        self.version
    }

    /// The peer's STATUS snapshot from the handshake.
    pub const fn peer_status(&self) -> &Status {
        &self.peer_status
    }

    /// True once the session task has shut down.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Registers an event subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn request(&self, request: EthRequest) -> Result<EthResponse, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Request { request, tx })
            .map_err(|_| RequestError::channel_closed())?;
        rx.await.map_err(|_| RequestError::session_closed(None))?
    }

    /// Requests headers; resolves with the decoded header list.
    pub async fn get_block_headers(
        &self,
        request: GetBlockHeaders,
    ) -> Result<Vec<Header>, RequestError> {
        match self.request(EthRequest::BlockHeaders(request)).await? {
            EthResponse::BlockHeaders(headers) => Ok(headers),
            _ => Err(RequestError { kind: crate::RequestErrorKind::Decode, request_id: None }),
        }
    }

    /// Requests block bodies for the given hashes.
    pub async fn get_block_bodies(
        &self,
        hashes: Vec<B256>,
    ) -> Result<Vec<BlockBody>, RequestError> {
        match self.request(EthRequest::BlockBodies(hashes)).await? {
            EthResponse::BlockBodies(bodies) => Ok(bodies),
            _ => Err(RequestError { kind: crate::RequestErrorKind::Decode, request_id: None }),
        }
    }

    /// Requests pooled transactions for the given hashes.
    pub async fn get_pooled_transactions(
        &self,
        hashes: Vec<B256>,
    ) -> Result<Vec<PooledTransaction>, RequestError> {
        match self.request(EthRequest::PooledTransactions(hashes)).await? {
            EthResponse::PooledTransactions(txs) => Ok(txs),
            _ => Err(RequestError { kind: crate::RequestErrorKind::Decode, request_id: None }),
        }
    }

    /// Requests receipt lists for the given block hashes.
    pub async fn get_receipts(
        &self,
        hashes: Vec<B256>,
    ) -> Result<Vec<Vec<ReceiptEnvelope>>, RequestError> {
        match self.request(EthRequest::Receipts(hashes)).await? {
            EthResponse::Receipts(receipts) => Ok(receipts),
            _ => Err(RequestError { kind: crate::RequestErrorKind::Decode, request_id: None }),
        }
    }

    /// Requests raw trie nodes; only meaningful up to eth/66.
    pub async fn get_node_data(&self, hashes: Vec<B256>) -> Result<Vec<Bytes>, RequestError> {
        match self.request(EthRequest::NodeData(hashes)).await? {
            EthResponse::NodeData(nodes) => Ok(nodes),
            _ => Err(RequestError { kind: crate::RequestErrorKind::Decode, request_id: None }),
        }
    }

    /// Announces a freshly imported block.
    pub fn announce_new_block(&self, block: Block, td: U256) {
        let _ = self.commands.send(SessionCommand::Announce(EthMessage::NewBlock(Box::new(
            NewBlock { block, td },
        ))));
    }

    /// Announces new block hashes.
    pub fn announce_new_block_hashes(&self, hashes: NewBlockHashes) {
        let _ = self.commands.send(SessionCommand::Announce(EthMessage::NewBlockHashes(hashes)));
    }

    /// Broadcasts full transactions.
    pub fn announce_transactions(&self, txs: Vec<TxEnvelope>) {
        let _ = self
            .commands
            .send(SessionCommand::Announce(EthMessage::Transactions(Transactions(txs))));
    }

    /// Announces pooled transactions by hash, in the shape the negotiated
    /// version prescribes. Each entry is `(type, encoded size, hash)`.
    pub fn announce_tx_hashes(&self, txs: Vec<(u8, u32, B256)>) {
        let message = if self.version.has_typed_announcements() {
            let mut types = Vec::with_capacity(txs.len());
            let mut sizes = Vec::with_capacity(txs.len());
            let mut hashes = Vec::with_capacity(txs.len());
            for (ty, size, hash) in txs {
                types.push(ty);
                sizes.push(size);
                hashes.push(hash);
            }
            NewPooledTransactionHashes::Eth68(NewPooledTransactionHashes68 {
                types: types.into(),
                sizes,
                hashes,
            })
        } else {
            NewPooledTransactionHashes::Eth66(NewPooledTransactionHashes66(
                txs.into_iter().map(|(_, _, hash)| hash).collect(),
            ))
        };
        let _ = self
            .commands
            .send(SessionCommand::Announce(EthMessage::NewPooledTransactionHashes(message)));
    }

    /// Asks the session to disconnect the peer.
    pub fn disconnect(&self, reason: DisconnectReason) {
        let _ = self.commands.send(SessionCommand::Disconnect(reason));
    }
}

/// Entry point for establishing ETH sessions on authenticated connections.
#[derive(Debug)]
pub struct EthSession;

impl EthSession {
    /// Runs the STATUS handshake on the connection and spawns the session's
    /// service task.
    ///
    /// Fails (and tears the connection down with an appropriate Disconnect)
    /// when no eth capability was negotiated, the peer's STATUS is
    /// incompatible, or the exchange times out.
    pub async fn start<Io>(
        mut conn: Connection<Io>,
        ctx: SessionContext,
        config: SessionConfig,
    ) -> Result<SessionHandle, SessionError>
    where
        Io: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (version, offset) = match conn
            .shared_capabilities()
            .iter()
            .find(|cap| cap.capability.name == "eth")
            .and_then(|cap| {
                EthVersion::try_from(cap.capability.version).ok().map(|v| (v, cap.offset))
            }) {
            Some(found) => found,
            None => {
                let err = SessionError::NoEthCapability;
                let _ = conn.disconnect(DisconnectReason::UselessPeer).await;
                return Err(err);
            }
        };

        let local_status = Self::local_status(&ctx, version);
        let head = ctx.chain.latest_header();
        let fork_filter = ctx.chain_config.fork_filter(Head {
            number: head.number,
            timestamp: head.timestamp,
            ..Default::default()
        });

        let handshake = async {
            let mut payload = Vec::new();
            EthMessage::Status(local_status).encode_payload(&mut payload);
            conn.send(offset + EthMessageId::Status as u8, &payload).await?;

            loop {
                let Message { code, payload } = conn.next_message().await?;
                let routed = match conn.route(code).map_err(SessionError::Protocol)? {
                    RoutedCode::Base(id) => Route::Base(id),
                    RoutedCode::Subprotocol { message_id, .. } => Route::Eth(message_id),
                };
                match routed {
                    Route::Base(base_id) => {
                        if let Ok(P2PMessage::Ping) = P2PMessage::decode_payload(base_id, &payload)
                        {
                            conn.send_pong().await?;
                        }
                    }
                    Route::Eth(message_id) => {
                        let id = EthMessageId::try_from(message_id)
                            .map_err(SessionError::Message)?;
                        if id != EthMessageId::Status {
                            return Err(StatusError::ExpectedStatus(id).into());
                        }
                        let status = match EthMessage::decode(id, version, &mut &payload[..])
                            .map_err(SessionError::Message)?
                        {
                            EthMessage::Status(status) => status,
                            _ => unreachable!("Status id decodes to a Status message"),
                        };
                        return Ok(status);
                    }
                }
            }
        };

        let peer_status =
            match tokio::time::timeout(config.status_timeout, handshake).await {
                Ok(Ok(status)) => status,
                Ok(Err(err)) => return Self::fail_handshake(conn, err).await,
                Err(_) => return Self::fail_handshake(conn, SessionError::StatusTimeout).await,
            };

        if let Err(err) = local_status.validate(&peer_status, &fork_filter) {
            return Self::fail_handshake(conn, err.into()).await;
        }

        let peer_id = conn.remote_id();
        let client_id = conn.remote_hello().client_id.clone();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let handle = SessionHandle {
            peer_id,
            client_id,
            version,
            peer_status,
            commands: commands_tx,
            events: events_tx.clone(),
        };

        let _ = events_tx.send(SessionEvent::Connected { status: peer_status });
        debug!(peer = %peer_id, %version, "ETH session established");

        let service = SessionService {
            conn,
            ctx,
            config,
            version,
            offset,
            peer_id,
            requests: RequestManager::default(),
            commands: commands_rx,
            events: events_tx,
            awaiting_pong: None,
        };
        tokio::spawn(service.run());

        Ok(handle)
    }

    fn local_status(ctx: &SessionContext, version: EthVersion) -> Status {
        let head = ctx.chain.latest_header();
        let head_ref = Head {
            number: head.number,
            timestamp: head.timestamp,
            ..Default::default()
        };
        Status::builder()
            .version(version)
            .chain(ctx.chain_config.chain_id())
            .total_difficulty(ctx.chain.total_difficulty())
            .blockhash(head.hash_slow())
            .genesis(ctx.chain.genesis().hash_slow())
            .forkid(ctx.chain_config.fork_id(head_ref))
            .build()
    }

    async fn fail_handshake<Io>(
        mut conn: Connection<Io>,
        err: SessionError,
    ) -> Result<SessionHandle, SessionError>
    where
        Io: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(reason) = err.disconnect_reason() {
            let _ = conn.disconnect(reason).await;
        }
        Err(err)
    }
}

struct SessionService<Io> {
    conn: Connection<Io>,
    ctx: SessionContext,
    config: SessionConfig,
    version: EthVersion,
    offset: u8,
    peer_id: PeerId,
    requests: RequestManager,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    /// When a ping went out and no pong came back yet.
    awaiting_pong: Option<Instant>,
}

impl<Io: AsyncRead + AsyncWrite + Unpin> SessionService<Io> {
    async fn run(mut self) {
        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately
        ping_interval.tick().await;

        let outcome: Result<Option<DisconnectReason>, SessionError> = loop {
            // Bias: commands before deadlines before keepalive before socket,
            // so local callers never starve behind a chatty peer.
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Err(err) = self.handle_command(command).await {
                            break Err(err);
                        }
                        if self.conn.state() == ethp2p_rlpx::ConnectionState::Closed {
                            // a Disconnect command ran its course
                            break Ok(None);
                        }
                    }
                    // every handle dropped; tear down quietly
                    None => {
                        let _ = self.conn.disconnect(DisconnectReason::ClientQuitting).await;
                        break Ok(None);
                    }
                },

                id = self.requests.next_timeout() => {
                    trace!(peer = %self.peer_id, request_id = id, "request timed out");
                    self.requests.expire(id);
                },

                _ = ping_interval.tick() => {
                    match self.awaiting_pong {
                        Some(since) if since.elapsed() >= self.config.pong_timeout => {
                            break Err(SessionError::PingTimeout);
                        }
                        Some(_) => {}
                        None => {
                            if let Err(err) = self.conn.send_ping().await {
                                break Err(err.into());
                            }
                            self.awaiting_pong = Some(Instant::now());
                        }
                    }
                },

                message = self.conn.next_message() => match message {
                    Ok(message) => {
                        if let Err(err) = self.handle_message(message).await {
                            break Err(err);
                        }
                    }
                    Err(ConnectionError::Disconnected(reason)) => {
                        break Ok(Some(reason));
                    }
                    Err(err) => break Err(err.into()),
                },
            }
        };

        self.shutdown(outcome).await;
    }

    async fn shutdown(mut self, outcome: Result<Option<DisconnectReason>, SessionError>) {
        self.requests.close_all();

        let (reason, initiated_by_us) = match outcome {
            // the peer disconnected us, or we closed deliberately
            Ok(peer_reason) => (peer_reason, peer_reason.is_none()),
            Err(err) => {
                warn!(peer = %self.peer_id, %err, "session closed with error");
                let _ = self.events.send(SessionEvent::Error(err.to_string()));
                let reason = err.disconnect_reason();
                if let Some(reason) = reason {
                    let _ = self.conn.disconnect(reason).await;
                } else {
                    self.conn.close();
                }
                (reason, true)
            }
        };

        let _ = self.events.send(SessionEvent::Closed { reason, initiated_by_us });
        debug!(peer = %self.peer_id, ?reason, initiated_by_us, "ETH session closed");
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        match command {
            SessionCommand::Request { request, tx } => {
                if matches!(request, EthRequest::NodeData(_)) && !self.version.has_get_node_data()
                {
                    let _ = tx.send(Err(RequestError {
                        kind: crate::RequestErrorKind::UnsupportedVersion,
                        request_id: None,
                    }));
                    return Ok(());
                }
                if let Some(id) =
                    self.requests.insert(request.clone(), tx, self.config.request_timeout)
                {
                    self.send_eth(request.into_message(id)).await?;
                }
                Ok(())
            }
            SessionCommand::Announce(message) => self.send_eth(message).await,
            SessionCommand::Disconnect(reason) => {
                self.conn.disconnect(reason).await?;
                Ok(())
            }
        }
    }

    async fn send_eth(&mut self, message: EthMessage) -> Result<(), SessionError> {
        let code = self.offset + message.message_id() as u8;
        let payload = message.encoded_payload();
        self.conn.send(code, &payload).await?;
        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), SessionError> {
        let Message { code, payload } = message;
        let routed = match self.conn.route(code).map_err(SessionError::Protocol)? {
            RoutedCode::Base(id) => Route::Base(id),
            RoutedCode::Subprotocol { message_id, .. } => Route::Eth(message_id),
        };
        let message_id = match routed {
            Route::Base(base_id) => {
                match P2PMessage::decode_payload(base_id, &payload) {
                    Ok(P2PMessage::Ping) => self.conn.send_pong().await?,
                    Ok(P2PMessage::Pong) => self.awaiting_pong = None,
                    _ => {}
                }
                return Ok(());
            }
            Route::Eth(message_id) => message_id,
        };

        let id = EthMessageId::try_from(message_id).map_err(SessionError::Message)?;
        let message =
            EthMessage::decode(id, self.version, &mut &payload[..]).map_err(SessionError::Message)?;
        let request_id = message.request_id();

        match message {
            EthMessage::Status(_) => return Err(StatusError::Duplicate.into()),

            // responses complete their pending request; unmatched ids are
            // surfaced but not fatal
            EthMessage::BlockHeaders(pair) => {
                self.complete(id, pair.request_id, EthResponse::BlockHeaders(pair.message));
            }
            EthMessage::BlockBodies(pair) => {
                self.complete(id, pair.request_id, EthResponse::BlockBodies(pair.message));
            }
            EthMessage::PooledTransactions(pair) => {
                self.complete(id, pair.request_id, EthResponse::PooledTransactions(pair.message));
            }
            EthMessage::NodeData(pair) => {
                self.complete(id, pair.request_id, EthResponse::NodeData(pair.message));
            }
            EthMessage::Receipts(pair) => {
                self.complete(id, pair.request_id, EthResponse::Receipts(pair.message));
            }

            // requests are answered from the collaborators
            EthMessage::GetBlockHeaders(pair) => {
                let response = handlers::get_block_headers(&self.ctx, pair);
                self.send_eth(response).await?;
            }
            EthMessage::GetBlockBodies(pair) => {
                let response = handlers::get_block_bodies(&self.ctx, pair);
                self.send_eth(response).await?;
            }
            EthMessage::GetPooledTransactions(pair) => {
                let response = handlers::get_pooled_transactions(&self.ctx, pair);
                self.send_eth(response).await?;
            }
            EthMessage::GetNodeData(pair) => {
                let response = handlers::get_node_data(&self.ctx, pair);
                self.send_eth(response).await?;
            }
            EthMessage::GetReceipts(pair) => {
                let response = handlers::get_receipts(&self.ctx, pair);
                self.send_eth(response).await?;
            }

            // announcements are forwarded to the collaborators
            EthMessage::NewBlock(new_block) => {
                handlers::new_block(&self.ctx, *new_block, self.peer_id);
            }
            EthMessage::NewBlockHashes(hashes) => {
                handlers::new_block_hashes(&self.ctx, hashes, self.peer_id);
            }
            EthMessage::Transactions(txs) => {
                handlers::transactions(&self.ctx, txs, self.peer_id);
            }
            EthMessage::NewPooledTransactionHashes(hashes) => {
                handlers::new_pooled_transaction_hashes(&self.ctx, hashes, self.peer_id);
            }
        }

        let _ = self.events.send(SessionEvent::Message { id, request_id });
        Ok(())
    }

    /// Completes the pending request `request_id` with `response`. A
    /// response that matches no pending id, or the wrong response type for
    /// the id, never fails the session.
    fn complete(&mut self, id: EthMessageId, request_id: u64, response: EthResponse) {
        let matched = self
            .requests
            .expected_response(request_id)
            .map(|expected| expected == id)
            .unwrap_or(false);
        if matched {
            self.requests.complete(request_id, Ok(response));
        } else if self.requests.expected_response(request_id).is_some() {
            // known id, wrong shape
            self.requests.complete(
                request_id,
                Err(RequestError { kind: crate::RequestErrorKind::Decode, request_id: Some(request_id) }),
            );
        } else {
            trace!(peer = %self.peer_id, request_id, ?id, "response matches no pending request");
            let _ = self.events.send(SessionEvent::UnexpectedResponse { id, request_id });
        }
    }
}
