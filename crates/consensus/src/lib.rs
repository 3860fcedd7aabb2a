//! Consensus wire types for the ETH peer-to-peer protocol: the five
//! transaction variants with their RLP encodings and signing hashes, block
//! headers and bodies, typed receipts, and the intrinsic-gas rules they are
//! validated against.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

pub mod crypto;

pub use secp256k1;

mod error;
pub use error::TxError;

pub mod eip2718;
pub use eip2718::{Decodable2718, Encodable2718, Typed2718};

mod hardfork;
pub use hardfork::Hardfork;

mod gas;
pub use gas::{intrinsic_gas, GasSchedule};

mod header;
pub use header::Header;

pub use constants::{EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH};

mod block;
pub use block::{Block, BlockBody, Withdrawal};

mod receipt;
pub use receipt::{Receipt, ReceiptEnvelope, ReceiptStatus, ReceiptWithBloom};

pub mod transaction;
pub use transaction::{
    from_eip155_value, to_eip155_value, Blob, BlobTransactionSidecar, BlobTransactionSidecarV1,
    Bytes48, PooledTransaction, SignableTransaction, Transaction, TxEip1559, TxEip2930, TxEip4844,
    TxEip4844Variant, TxEip4844WithSidecar, TxEip7702, TxEnvelope, TxLegacy, TxSidecar, TxType,
};

mod signed;
pub use signed::Signed;
