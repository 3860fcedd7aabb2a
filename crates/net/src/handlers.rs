//! Inbound dispatch: requests answered from the collaborators,
//! announcements forwarded to them.
//!
//! Handler failures are caught by the dispatcher and never propagate into
//! the session's read loop.

use crate::{PeerId, SessionContext};
use ethp2p_wire::{
    EthMessage, GetBlockBodies, GetBlockHeaders, GetNodeData, GetPooledTransactions, GetReceipts,
    NewBlock, NewBlockHashes, NewPooledTransactionHashes, RequestPair, Transactions,
};

/// Ceiling on the headers served from one request.
pub(crate) const MAX_HEADERS_SERVE: u64 = 1024;

/// Ceiling on the bodies, receipt lists or pooled transactions served from
/// one request.
pub(crate) const MAX_BODIES_SERVE: usize = 256;

pub(crate) fn get_block_headers(
    ctx: &SessionContext,
    request: RequestPair<GetBlockHeaders>,
) -> EthMessage {
    let GetBlockHeaders { start_block, limit, skip, reverse } = request.message;
    let headers =
        ctx.chain.get_headers(start_block, limit.min(MAX_HEADERS_SERVE), skip, reverse);
    EthMessage::BlockHeaders(RequestPair { request_id: request.request_id, message: headers })
}

pub(crate) fn get_block_bodies(
    ctx: &SessionContext,
    request: RequestPair<GetBlockBodies>,
) -> EthMessage {
    let bodies = request
        .message
        .0
        .iter()
        .take(MAX_BODIES_SERVE)
        .filter_map(|hash| ctx.chain.get_body(*hash))
        .collect();
    EthMessage::BlockBodies(RequestPair { request_id: request.request_id, message: bodies })
}

pub(crate) fn get_pooled_transactions(
    ctx: &SessionContext,
    request: RequestPair<GetPooledTransactions>,
) -> EthMessage {
    let hashes = &request.message.0[..request.message.0.len().min(MAX_BODIES_SERVE)];
    let transactions = ctx.txpool.get_by_hash(hashes);
    EthMessage::PooledTransactions(RequestPair {
        request_id: request.request_id,
        message: transactions,
    })
}

pub(crate) fn get_receipts(
    ctx: &SessionContext,
    request: RequestPair<GetReceipts>,
) -> EthMessage {
    let receipts = request
        .message
        .0
        .iter()
        .take(MAX_BODIES_SERVE)
        .map(|hash| ctx.receipts.get_receipts(*hash))
        .collect();
    EthMessage::Receipts(RequestPair { request_id: request.request_id, message: receipts })
}

pub(crate) fn get_node_data(
    ctx: &SessionContext,
    request: RequestPair<GetNodeData>,
) -> EthMessage {
    let hashes = &request.message.0[..request.message.0.len().min(MAX_BODIES_SERVE)];
    let nodes = ctx.chain.get_node_data(hashes);
    EthMessage::NodeData(RequestPair { request_id: request.request_id, message: nodes })
}

pub(crate) fn new_block(ctx: &SessionContext, message: NewBlock, peer: PeerId) {
    ctx.synchronizer.handle_new_block(message.block, message.td, peer);
}

pub(crate) fn new_block_hashes(ctx: &SessionContext, message: NewBlockHashes, peer: PeerId) {
    ctx.synchronizer.handle_new_block_hashes(message.0, peer);
}

pub(crate) fn transactions(ctx: &SessionContext, message: Transactions, peer: PeerId) {
    ctx.txpool.handle_announced_txs(message.0, peer);
}

pub(crate) fn new_pooled_transaction_hashes(
    ctx: &SessionContext,
    message: NewPooledTransactionHashes,
    peer: PeerId,
) {
    ctx.txpool.handle_announced_tx_hashes(message, peer);
}
