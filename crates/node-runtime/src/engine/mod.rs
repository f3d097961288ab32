//! # Engine API
//!
//! The operations exposed to clients, and the error envelope they return.

pub mod api;
pub mod error;

pub use api::{ArchiveEngine, ArchiveVerification, BlockchainInfo, SyncStatus, TxReceipt};
pub use error::{EngineError, EngineResult};
