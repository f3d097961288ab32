//! # Network Bridge
//!
//! Abstracts peer broadcast and receive so the engine can propagate blocks
//! and transactions without knowing the transport.
//!
//! ```text
//! [Engine] ──broadcast(msg)──→ [NetworkBridge] ──→ peers
//!    ↑                               │
//!    └────── on_receive() queue ←────┘
//! ```
//!
//! Validator votes are ordinary signed transactions, so they reach every
//! node's ledger through blocks rather than being applied on arrival.

pub mod domain;
pub mod memory;
pub mod metrics;
pub mod ports;

pub use domain::{
    InboundMessage, NetworkError, NetworkMessage, NetworkResult, PeerId, MAX_MESSAGE_SIZE,
};
pub use memory::{InMemoryBridge, InMemoryNetwork, DEFAULT_INBOUND_CAPACITY};
pub use ports::NetworkBridge;
