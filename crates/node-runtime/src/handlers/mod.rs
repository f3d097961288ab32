//! # Handlers
//!
//! Long-running workers that feed network traffic into the engine.

pub mod inbound;

pub use inbound::{spawn_inbound_worker, INBOUND_BATCH_LIMIT};
