//! The RLPx transport: ECIES handshake and session secrets, encrypted
//! framing with chained MACs, the devp2p base protocol (Hello, Disconnect,
//! Ping/Pong), capability negotiation, and the per-connection driver.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

mod error;
pub use error::{ConnectionError, DisconnectReason, EciesError, FrameError, P2PError};

pub mod ecies;
pub use ecies::Handshake;

mod secrets;
pub use secrets::{MacState, SessionSecrets};

mod codec;
pub use codec::FrameCodec;

mod p2p;
pub use p2p::{
    Capability, HelloMessage, P2PMessage, BASE_PROTOCOL_LENGTH, BASE_PROTOCOL_VERSION,
    MAX_PAYLOAD_SIZE, PING_INTERVAL, PING_TIMEOUT,
};

mod mux;
pub use mux::{negotiate_capabilities, RoutedCode, SharedCapability};

mod conn;
pub use conn::{node_id, Connection, ConnectionConfig, ConnectionState, Direction, Message};

/// The 64-byte uncompressed public key identifying a node on the wire.
pub type PeerId = alloy_primitives::B512;

/// Converts a secp256k1 public key into the 64-byte node id used on the
/// wire.
pub fn pk2id(pk: &secp256k1::PublicKey) -> PeerId {
    PeerId::from_slice(&pk.serialize_uncompressed()[1..])
}

/// Converts a 64-byte node id back into a secp256k1 public key.
pub fn id2pk(id: PeerId) -> Result<secp256k1::PublicKey, EciesError> {
    let mut buf = [0u8; 65];
    buf[0] = 4; // SECP256K1_TAG_PUBKEY_UNCOMPRESSED
    buf[1..].copy_from_slice(id.as_slice());
    secp256k1::PublicKey::from_slice(&buf).map_err(EciesError::from)
}
