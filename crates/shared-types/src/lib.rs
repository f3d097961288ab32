//! # Shared Types Crate
//!
//! Domain entities and cross-crate contracts for the ArchiveChain core.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: transactions, blocks and identifiers that cross
//!   crate boundaries are defined here.
//! - **Closed error kinds**: every crate error maps onto one [`ErrorKind`] so the
//!   recovery layer and the API boundary can classify it without downcasting.
//! - **Injected time**: nothing reads the wall clock directly; components take a
//!   [`TimeSource`].

pub mod entities;
pub mod errors;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
