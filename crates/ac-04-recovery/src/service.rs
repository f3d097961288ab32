//! # Recovery Manager
//!
//! Explicitly constructed and shared by `Arc`; there is no global instance.

use crate::domain::backoff::RetryPolicy;
use crate::domain::checkpoint::{Checkpoint, Snapshottable};
use crate::domain::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::domain::error::RecoveryError;
use crate::metrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{Classify, TimeSource};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Recovery tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
}

/// Counters since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub checkpoints_created: u64,
    pub rollbacks: u64,
    pub retries: u64,
    pub short_circuited: u64,
    pub restore_failures: u64,
}

#[derive(Default)]
struct Counters {
    checkpoints_created: AtomicU64,
    rollbacks: AtomicU64,
    retries: AtomicU64,
    short_circuited: AtomicU64,
    restore_failures: AtomicU64,
}

pub struct RecoveryManager {
    config: RecoveryConfig,
    time: Arc<dyn TimeSource>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    emergency_stop: AtomicBool,
    counters: Counters,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig, time: Arc<dyn TimeSource>) -> Self {
        Self {
            config,
            time,
            breakers: RwLock::new(HashMap::new()),
            emergency_stop: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Breaker for `category`, created on first use.
    pub fn breaker(&self, category: &str) -> Arc<CircuitBreaker> {
        if let Some(b) = self.breakers.read().get(category) {
            return b.clone();
        }
        self.breakers
            .write()
            .entry(category.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(category, self.config.breaker)))
            .clone()
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    /// Operator action after inspecting state.
    pub fn clear_emergency_stop(&self) {
        if self.emergency_stop.swap(false, Ordering::SeqCst) {
            warn!("Emergency stop cleared");
        }
    }

    fn engage_emergency_stop(&self, operation: &str) {
        if !self.emergency_stop.swap(true, Ordering::SeqCst) {
            error!(operation, "Emergency stop engaged after failed restore");
            metrics::record_emergency_stop();
        }
    }

    pub fn stats(&self) -> RecoveryStats {
        let c = &self.counters;
        RecoveryStats {
            checkpoints_created: c.checkpoints_created.load(Ordering::Relaxed),
            rollbacks: c.rollbacks.load(Ordering::Relaxed),
            retries: c.retries.load(Ordering::Relaxed),
            short_circuited: c.short_circuited.load(Ordering::Relaxed),
            restore_failures: c.restore_failures.load(Ordering::Relaxed),
        }
    }

    /// Run `f` with `target` checkpointed.
    ///
    /// Must be called inside the critical section that isolates `target`:
    /// the restore overwrites whatever `target` holds at failure time.
    pub fn checkpointed<T, E, F>(
        &self,
        operation: &str,
        target: &dyn Snapshottable,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RecoveryError> + fmt::Display,
    {
        if self.is_emergency_stopped() {
            return Err(RecoveryError::EmergencyStop.into());
        }

        let checkpoint = Checkpoint::capture(operation, target, self.time.now())?;
        self.counters
            .checkpoints_created
            .fetch_add(1, Ordering::Relaxed);

        match f() {
            Ok(value) => Ok(value),
            Err(err) => match checkpoint.restore_into(target) {
                Ok(()) => {
                    self.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
                    metrics::record_rollback(operation);
                    warn!(
                        operation,
                        checkpoint = %checkpoint.id,
                        error = %err,
                        "Rolled back to checkpoint"
                    );
                    Err(err)
                }
                Err(restore_err) => {
                    self.counters
                        .restore_failures
                        .fetch_add(1, Ordering::Relaxed);
                    self.engage_emergency_stop(operation);
                    error!(
                        operation,
                        original = %err,
                        restore = %restore_err,
                        "Checkpoint restore failed"
                    );
                    Err(RecoveryError::RestoreFailed {
                        operation: operation.to_string(),
                        reason: restore_err.to_string(),
                    }
                    .into())
                }
            },
        }
    }

    /// Run `op` under the category breaker, retrying retryable failures with
    /// backoff. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, category: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + From<RecoveryError> + fmt::Display,
    {
        let breaker = self.breaker(category);
        let mut attempt = 1u32;

        loop {
            if self.is_emergency_stopped() {
                return Err(RecoveryError::EmergencyStop.into());
            }
            if let Err(remaining) = breaker.check() {
                self.counters.short_circuited.fetch_add(1, Ordering::Relaxed);
                return Err(RecoveryError::CircuitOpen {
                    category: category.to_string(),
                    retry_after_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                }
                .into());
            }

            let err = match op(attempt).await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if kind.is_retryable() && self.config.retry.should_retry(attempt) {
                let delay = self.config.retry.backoff.delay_for(attempt);
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                metrics::record_retry(category);
                debug!(
                    category,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after retryable failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if kind.counts_as_fault() {
                breaker.record_failure();
            } else {
                // The system answered correctly; the caller was wrong.
                breaker.record_success();
            }
            return Err(err);
        }
    }
}
