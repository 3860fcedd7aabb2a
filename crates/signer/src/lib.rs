//! Hardfork-indexed signer selection: which transaction variants a fork
//! accepts, how the signature `v` value is encoded, and the sign / recover
//! operations built on those rules.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
pub use error::SignerError;

mod signer;
pub use signer::{Signer, VEncoding};

mod cache;
pub use cache::SenderCache;

pub use ethp2p_consensus::Hardfork;
