//! The ETH sub-protocol wire codec: the fifteen message definitions with
//! their per-version RLP shapes, the STATUS handshake payload, and fork-id
//! compatibility validation.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{MessageError, StatusError};

mod version;
pub use version::EthVersion;

mod status;
pub use status::{Status, StatusBuilder};

mod requests;
pub use requests::{
    BlockHashOrNumber, GetBlockBodies, GetBlockHeaders, GetNodeData, GetPooledTransactions,
    GetReceipts, RequestPair,
};

mod broadcast;
pub use broadcast::{
    BlockHashNumber, NewBlock, NewBlockHashes, NewPooledTransactionHashes,
    NewPooledTransactionHashes66, NewPooledTransactionHashes68, Transactions,
};

mod message;
pub use message::{EthMessage, EthMessageId};

pub use alloy_eip2124::{ForkFilter, ForkFilterKey, ForkHash, ForkId, Head, ValidationError};
