//! # Error & Recovery Layer
//!
//! Wraps state-mutating operations so a failure leaves no partial state
//! behind.
//!
//! ## Pieces
//!
//! - [`Checkpoint`] / [`Snapshottable`]: serialized pre-state of a target,
//!   taken inside the caller's critical section and restored on failure.
//! - [`RetryPolicy`] / [`BackoffStrategy`]: bounded retry for retryable
//!   (lock contention) failures.
//! - [`CircuitBreaker`]: per operation-category, opens after consecutive
//!   faults and short-circuits for a cool-down window.
//! - [`RecoveryManager`]: composes the above. A failed restore engages the
//!   emergency stop; every guarded call then fails fast until an operator
//!   clears it.
//!
//! ## Usage
//!
//! ```text
//! recovery.run("contract.vote", |attempt| async {
//!     let guard = locks.acquire_all(..).await?;      // may fail: Concurrency, retried
//!     recovery.checkpointed("vote", &scope, || {      // rollback on any error
//!         mutate(&guard)
//!     })
//! }).await
//! ```

pub mod domain;
pub mod metrics;
pub mod service;

pub use domain::backoff::{BackoffStrategy, RetryPolicy};
pub use domain::checkpoint::{Checkpoint, Snapshottable};
pub use domain::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use domain::error::{RecoveryError, RecoveryResult};
pub use service::{RecoveryConfig, RecoveryManager, RecoveryStats};
