//! # Ledger Metrics
//!
//! Prometheus series behind the `metrics` feature; no-ops otherwise.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref SNAPSHOT_BYTES: Histogram = register_histogram!(
        "ledger_snapshot_bytes",
        "Size of ledger snapshots taken for checkpoints",
        vec![256.0, 4_096.0, 65_536.0, 1_048_576.0, 16_777_216.0]
    )
    .expect("Failed to create SNAPSHOT_BYTES metric");

    pub static ref RESTORES: IntCounter = register_int_counter!(
        "ledger_restores_total",
        "Snapshots restored into the ledger"
    )
    .expect("Failed to create RESTORES metric");
}

#[cfg(feature = "metrics")]
pub fn record_snapshot(bytes: usize) {
    SNAPSHOT_BYTES.observe(bytes as f64);
}

#[cfg(feature = "metrics")]
pub fn record_restore() {
    RESTORES.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_snapshot(_bytes: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_restore() {}
