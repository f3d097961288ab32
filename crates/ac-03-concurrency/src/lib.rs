//! # Concurrency Manager
//!
//! Resource-keyed locks in three modes:
//!
//! | Held \ Requested | Shared | Upgrade | Exclusive |
//! |------------------|--------|---------|-----------|
//! | Shared           | yes    | yes     | no        |
//! | Upgrade          | yes    | no      | no        |
//! | Exclusive        | no     | no      | no        |
//!
//! An Upgrade holder can promote to Exclusive in place once the shared
//! holders drain; new Shared requests queue behind a pending promotion.
//!
//! ## Deadlock handling
//!
//! - [`LockManager::acquire_all`] sorts requests by [`ResourceId`] so every
//!   multi-resource operation locks in one global order.
//! - Ad-hoc acquisitions are checked against a wait-for graph; a request
//!   that would close a cycle fails with `DeadlockSuspected`.
//! - Every wait is bounded by a deadline; partial multi-locks are released
//!   on failure.
//!
//! ## Liveness
//!
//! Sessions heartbeat. The sweeper evicts sessions that stop heartbeating
//! and releases everything they hold.

pub mod domain;
pub mod metrics;
pub mod service;

pub use domain::error::{ConcurrencyError, ConcurrencyResult};
pub use domain::resource::{LockMode, ResourceId};
pub use service::{LockConfig, LockGuard, LockManager, LockSession, MultiLockGuard};
