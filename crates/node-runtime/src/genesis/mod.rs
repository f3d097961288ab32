//! # Genesis Module
//!
//! The genesis block has special properties:
//!
//! - Number: 0
//! - Parent hash: 32 zero bytes
//! - No transactions and no producer
//! - State root: the ledger after the configured allocations and stakes

pub mod builder;

pub use builder::{parse_address, Allocation, GenesisBuilder, GenesisError};
