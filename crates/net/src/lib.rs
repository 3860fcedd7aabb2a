//! The ETH protocol engine: per-connection sessions with a STATUS
//! handshake, request correlation and deduplication, inbound handler
//! dispatch, plus the listener, dialer and bounded peer pool that own the
//! socket lifecycle.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod config;
pub use config::SessionConfig;

mod error;
pub use error::{PoolError, RequestError, RequestErrorKind, SessionError};

mod traits;
pub use traits::{ChainConfig, ChainStore, ReceiptStore, SessionContext, Synchronizer, TxPool};

mod events;
pub use events::SessionEvent;

pub mod managers;

mod handlers;

mod session;
pub use session::{EthRequest, EthResponse, EthSession, SessionHandle};

mod dial;
pub use dial::Dialer;

mod listen;
pub use listen::{Listener, ListenerConfig, SlotHandle};

mod pool;
pub use pool::{PeerPool, PeerPoolConfig};

pub use ethp2p_rlpx::PeerId;
