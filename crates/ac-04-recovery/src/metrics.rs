//! # Recovery Metrics
//!
//! Enable with the `metrics` feature. Without it every function is a no-op.
//!
//! - `recovery_rollbacks_total{operation}`
//! - `recovery_retries_total{category}`
//! - `recovery_emergency_stops_total`

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref ROLLBACKS: IntCounterVec = register_int_counter_vec!(
        "recovery_rollbacks_total",
        "Operations rolled back to their checkpoint",
        &["operation"]
    )
    .expect("Failed to create ROLLBACKS metric");

    pub static ref RETRIES: IntCounterVec = register_int_counter_vec!(
        "recovery_retries_total",
        "Retries of retryable failures",
        &["category"]
    )
    .expect("Failed to create RETRIES metric");

    pub static ref EMERGENCY_STOPS: IntCounter = register_int_counter!(
        "recovery_emergency_stops_total",
        "Times the emergency stop was engaged"
    )
    .expect("Failed to create EMERGENCY_STOPS metric");
}

#[cfg(feature = "metrics")]
pub fn record_rollback(operation: &str) {
    ROLLBACKS.with_label_values(&[operation]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_retry(category: &str) {
    RETRIES.with_label_values(&[category]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_emergency_stop() {
    EMERGENCY_STOPS.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_rollback(_operation: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_retry(_category: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_emergency_stop() {}
