//! # ArchiveChain Test Suite
//!
//! Cross-crate flows that no single crate can test on its own.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Keys, funded genesis, wired nodes
//! └── integration/
//!     ├── crypto_flows.rs      # Signatures, challenges
//!     ├── ledger_flows.rs      # SafeMath ceiling, checkpoints, transfers
//!     ├── contract_flows.rs    # Quorum votes under concurrency
//!     ├── consensus_flows.rs   # Selection, rotation, block atomicity
//!     └── node_flows.rs        # Engine API across gossiping nodes
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ac-tests
//! cargo test -p ac-tests integration::contract_flows
//! cargo bench -p ac-tests
//! ```

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
