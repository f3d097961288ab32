//! # Node Runtime Library
//!
//! One ArchiveChain node: configuration, the service container, genesis,
//! the mempool, the engine API and the background tasks that keep them
//! moving. The `node-runtime` binary is a thin shell over [`NodeRuntime`].
//!
//! ## Layout
//!
//! - `container/` - Configuration loading and explicit service wiring
//! - `genesis/` - Genesis allocations and block 0
//! - `engine/` - Client-facing operations and their error envelope
//! - `handlers/` - Network inbound worker
//! - `mempool` - Fee-ordered transaction pool
//! - `runtime` - Task lifecycle (start, shutdown)

#![allow(clippy::type_complexity)]

pub mod container;
pub mod engine;
pub mod genesis;
pub mod handlers;
pub mod logging;
pub mod mempool;
pub mod runtime;

pub use container::{load_config, NodeConfig, NodeServices};
pub use engine::{ArchiveEngine, EngineError, EngineResult};
pub use logging::init_logging;
pub use mempool::{Mempool, MempoolError};
pub use runtime::NodeRuntime;
