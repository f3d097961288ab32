//! # Lock Metrics
//!
//! Prometheus counters behind the `metrics` feature; no-ops otherwise.
//!
//! - `lock_contended_total{resource_kind}`
//! - `lock_wait_seconds`
//! - `lock_timeouts_total`
//! - `lock_stale_released_total`
//! - `lock_deadlocks_total`

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref CONTENDED: IntCounterVec = register_int_counter_vec!(
        "lock_contended_total",
        "Acquisitions that had to wait",
        &["resource_kind"]
    )
    .expect("Failed to create CONTENDED metric");

    pub static ref WAIT_SECONDS: Histogram = register_histogram!(
        "lock_wait_seconds",
        "Time spent waiting for contended locks",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .expect("Failed to create WAIT_SECONDS metric");

    pub static ref TIMEOUTS: IntCounter = register_int_counter!(
        "lock_timeouts_total",
        "Acquisitions abandoned at their deadline"
    )
    .expect("Failed to create TIMEOUTS metric");

    pub static ref STALE_RELEASED: IntCounter = register_int_counter!(
        "lock_stale_released_total",
        "Locks reclaimed from stale sessions"
    )
    .expect("Failed to create STALE_RELEASED metric");

    pub static ref DEADLOCKS: IntCounter = register_int_counter!(
        "lock_deadlocks_total",
        "Waits aborted on a wait-for cycle"
    )
    .expect("Failed to create DEADLOCKS metric");
}

/// `contract:00000000000000000001` -> `contract`
#[cfg(feature = "metrics")]
fn resource_kind(resource: &str) -> &str {
    resource.split(':').next().unwrap_or(resource)
}

#[cfg(feature = "metrics")]
pub fn record_contention(resource: &str) {
    CONTENDED.with_label_values(&[resource_kind(resource)]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_wait(seconds: f64) {
    WAIT_SECONDS.observe(seconds);
}

#[cfg(feature = "metrics")]
pub fn record_timeout() {
    TIMEOUTS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_stale_released(count: u64) {
    STALE_RELEASED.inc_by(count);
}

#[cfg(feature = "metrics")]
pub fn record_deadlock() {
    DEADLOCKS.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_contention(_resource: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_wait(_seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_timeout() {}

#[cfg(not(feature = "metrics"))]
pub fn record_stale_released(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_deadlock() {}
