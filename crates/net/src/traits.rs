//! Contracts of the collaborators the engine reads from and routes to.
//!
//! The blockchain store, the transaction pool, the synchronizer and the
//! chain configuration are shared across sessions and bring their own
//! concurrency discipline; the engine never holds locks across I/O.

use crate::PeerId;
use alloy_primitives::{Bytes, B256, U256};
use auto_impl::auto_impl;
use ethp2p_consensus::{Block, BlockBody, Hardfork, Header, PooledTransaction, ReceiptEnvelope, TxEnvelope};
use ethp2p_wire::{BlockHashNumber, BlockHashOrNumber, ForkFilter, ForkId, Head, NewPooledTransactionHashes};
use std::sync::Arc;

/// Read access to the canonical chain.
#[auto_impl(&, Arc)]
pub trait ChainStore: Send + Sync {
    /// The best known header.
    fn latest_header(&self) -> Header;

    /// A block by hash.
    fn get_block(&self, hash: B256) -> Option<Block>;

    /// Headers walking the chain from `start`, at most `max`, `skip` blocks
    /// apart, optionally backwards.
    fn get_headers(&self, start: BlockHashOrNumber, max: u64, skip: u32, reverse: bool)
        -> Vec<Header>;

    /// A block body by hash.
    fn get_body(&self, hash: B256) -> Option<BlockBody>;

    /// The genesis block.
    fn genesis(&self) -> Block;

    /// Total difficulty of the best chain.
    fn total_difficulty(&self) -> U256;

    /// Raw trie nodes by hash, for GetNodeData on eth/66 and older. The
    /// default declines to serve state.
    fn get_node_data(&self, _hashes: &[B256]) -> Vec<Bytes> {
        Vec::new()
    }
}

/// The transaction pool's ingestion and lookup surface.
#[auto_impl(&, Arc)]
pub trait TxPool: Send + Sync {
    /// Pooled transactions by hash, in request order, misses skipped.
    fn get_by_hash(&self, hashes: &[B256]) -> Vec<PooledTransaction>;

    /// Full transactions a peer broadcast.
    fn handle_announced_txs(&self, txs: Vec<TxEnvelope>, peer: PeerId);

    /// Transaction hashes a peer announced.
    fn handle_announced_tx_hashes(&self, hashes: NewPooledTransactionHashes, peer: PeerId);
}

/// The block synchronizer's announcement surface.
#[auto_impl(&, Arc)]
pub trait Synchronizer: Send + Sync {
    /// A peer announced a full new block.
    fn handle_new_block(&self, block: Block, td: U256, peer: PeerId);

    /// A peer announced new block hashes.
    fn handle_new_block_hashes(&self, hashes: Vec<BlockHashNumber>, peer: PeerId);
}

/// Receipt access of the execution layer.
#[auto_impl(&, Arc)]
pub trait ReceiptStore: Send + Sync {
    /// Receipts of the block with the given hash, in transaction order.
    fn get_receipts(&self, block_hash: B256) -> Vec<ReceiptEnvelope>;
}

/// The chain-configuration manager: chain identity and hardfork schedule.
#[auto_impl(&, Arc)]
pub trait ChainConfig: Send + Sync {
    /// The chain id.
    fn chain_id(&self) -> u64;

    /// The hardfork in force at a block.
    fn hardfork_by_block(&self, number: u64, timestamp: u64) -> Hardfork;

    /// The fork id of the given chain head
    /// ([EIP-2124](https://eips.ethereum.org/EIPS/eip-2124)).
    fn fork_id(&self, head: Head) -> ForkId;

    /// A fork filter validating peer fork ids against the given head.
    fn fork_filter(&self, head: Head) -> ForkFilter;
}

/// The shared collaborators a session routes to.
#[derive(Clone)]
pub struct SessionContext {
    /// The canonical chain.
    pub chain: Arc<dyn ChainStore>,
    /// The transaction pool.
    pub txpool: Arc<dyn TxPool>,
    /// The block synchronizer.
    pub synchronizer: Arc<dyn Synchronizer>,
    /// The receipt store.
    pub receipts: Arc<dyn ReceiptStore>,
    /// The chain configuration.
    pub chain_config: Arc<dyn ChainConfig>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext").finish_non_exhaustive()
    }
}
