//! Shared fixtures: in-memory collaborators and duplex connection pairs.

use alloy_primitives::{B256, U256};
use ethp2p_consensus::{
    Block, BlockBody, Hardfork, Header, PooledTransaction, ReceiptEnvelope, TxEnvelope,
};
use ethp2p_net::{
    ChainConfig, ChainStore, PeerId, ReceiptStore, SessionContext, Synchronizer, TxPool,
};
use ethp2p_rlpx::{node_id, Connection, ConnectionConfig};
use ethp2p_wire::{
    BlockHashNumber, BlockHashOrNumber, ForkFilter, ForkFilterKey, ForkHash, ForkId, Head,
    NewPooledTransactionHashes,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::DuplexStream;

/// A small canned chain.
pub struct MockChain {
    pub headers: Vec<Header>,
}

impl MockChain {
    pub fn new(length: u64) -> Self {
        let mut headers = Vec::new();
        let mut parent_hash = B256::ZERO;
        for number in 0..length {
            let header = Header { number, parent_hash, timestamp: number * 12, ..Default::default() };
            parent_hash = header.hash_slow();
            headers.push(header);
        }
        Self { headers }
    }

    pub fn genesis_hash(&self) -> B256 {
        self.headers[0].hash_slow()
    }
}

impl ChainStore for MockChain {
    fn latest_header(&self) -> Header {
        self.headers.last().expect("chain is never empty").clone()
    }

    fn get_block(&self, hash: B256) -> Option<Block> {
        self.headers
            .iter()
            .find(|header| header.hash_slow() == hash)
            .map(|header| Block { header: header.clone(), ..Default::default() })
    }

    fn get_headers(
        &self,
        start: BlockHashOrNumber,
        max: u64,
        skip: u32,
        reverse: bool,
    ) -> Vec<Header> {
        let start = match start {
            BlockHashOrNumber::Number(number) => number,
            BlockHashOrNumber::Hash(hash) => {
                match self.headers.iter().position(|h| h.hash_slow() == hash) {
                    Some(index) => index as u64,
                    None => return Vec::new(),
                }
            }
        };
        let step = skip as u64 + 1;
        let mut headers = Vec::new();
        let mut number = start;
        while headers.len() < max as usize {
            match self.headers.get(number as usize) {
                Some(header) => headers.push(header.clone()),
                None => break,
            }
            if reverse {
                match number.checked_sub(step) {
                    Some(next) => number = next,
                    None => break,
                }
            } else {
                number += step;
            }
        }
        headers
    }

    fn get_body(&self, hash: B256) -> Option<BlockBody> {
        self.headers
            .iter()
            .any(|header| header.hash_slow() == hash)
            .then(BlockBody::default)
    }

    fn genesis(&self) -> Block {
        Block { header: self.headers[0].clone(), ..Default::default() }
    }

    fn total_difficulty(&self) -> U256 {
        U256::from(17_000 * self.headers.len() as u64)
    }
}

/// Records everything it is handed.
#[derive(Default)]
pub struct MockTxPool {
    pub announced_txs: Mutex<Vec<(usize, PeerId)>>,
    pub announced_hashes: Mutex<Vec<(usize, PeerId)>>,
    pub pooled: Mutex<Vec<PooledTransaction>>,
}

impl TxPool for MockTxPool {
    fn get_by_hash(&self, hashes: &[B256]) -> Vec<PooledTransaction> {
        self.pooled
            .lock()
            .iter()
            .filter(|tx| hashes.contains(tx.tx_hash()))
            .cloned()
            .collect()
    }

    fn handle_announced_txs(&self, txs: Vec<TxEnvelope>, peer: PeerId) {
        self.announced_txs.lock().push((txs.len(), peer));
    }

    fn handle_announced_tx_hashes(&self, hashes: NewPooledTransactionHashes, peer: PeerId) {
        self.announced_hashes.lock().push((hashes.len(), peer));
    }
}

#[derive(Default)]
pub struct MockSynchronizer {
    pub new_blocks: Mutex<Vec<(B256, PeerId)>>,
    pub new_hashes: Mutex<Vec<Vec<BlockHashNumber>>>,
}

impl Synchronizer for MockSynchronizer {
    fn handle_new_block(&self, block: Block, _td: U256, peer: PeerId) {
        self.new_blocks.lock().push((block.hash_slow(), peer));
    }

    fn handle_new_block_hashes(&self, hashes: Vec<BlockHashNumber>, _peer: PeerId) {
        self.new_hashes.lock().push(hashes);
    }
}

#[derive(Default)]
pub struct MockReceipts;

impl ReceiptStore for MockReceipts {
    fn get_receipts(&self, _block_hash: B256) -> Vec<ReceiptEnvelope> {
        Vec::new()
    }
}

pub struct MockChainConfig {
    pub chain_id: u64,
    pub genesis_hash: B256,
}

impl ChainConfig for MockChainConfig {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn hardfork_by_block(&self, _number: u64, _timestamp: u64) -> Hardfork {
        Hardfork::Prague
    }

    fn fork_id(&self, _head: Head) -> ForkId {
        ForkId { hash: ForkHash::from(self.genesis_hash), next: 0 }
    }

    fn fork_filter(&self, head: Head) -> ForkFilter {
        ForkFilter::new(head, self.genesis_hash, 0, Vec::<ForkFilterKey>::new())
    }
}

/// A full collaborator set over a canned chain.
pub struct Fixture {
    pub chain: Arc<MockChain>,
    pub txpool: Arc<MockTxPool>,
    pub synchronizer: Arc<MockSynchronizer>,
    pub ctx: SessionContext,
}

pub fn fixture(chain_len: u64) -> Fixture {
    let chain = Arc::new(MockChain::new(chain_len));
    let genesis_hash = chain.genesis_hash();
    let txpool = Arc::new(MockTxPool::default());
    let synchronizer = Arc::new(MockSynchronizer::default());
    let ctx = SessionContext {
        chain: chain.clone(),
        txpool: txpool.clone(),
        synchronizer: synchronizer.clone(),
        receipts: Arc::new(MockReceipts),
        chain_config: Arc::new(MockChainConfig { chain_id: 1, genesis_hash }),
    };
    Fixture { chain, txpool, synchronizer, ctx }
}

/// An authenticated RLPx pair over an in-memory duplex.
pub async fn rlpx_pair(
    a_key: u8,
    b_key: u8,
) -> (Connection<DuplexStream>, Connection<DuplexStream>) {
    let (a_io, b_io) = tokio::io::duplex(1 << 20);
    let a_cfg = ConnectionConfig::new(B256::repeat_byte(a_key));
    let b_cfg = ConnectionConfig::new(B256::repeat_byte(b_key));
    let b_id = node_id(b_cfg.secret_key).unwrap();

    let (a, b) = tokio::join!(
        Connection::dial(a_io, b_id, &a_cfg),
        Connection::accept(b_io, &b_cfg),
    );
    (a.unwrap(), b.unwrap())
}

/// Offset of the eth capability on a freshly negotiated pair.
pub const ETH_OFFSET: u8 = 16;
