//! # Consensus Metrics
//!
//! - `blocks_applied_total`
//! - `blocks_rejected_total{reason}`
//! - `chain_reorgs_total`
//! - `validators_slashed_total`
//! - `chain_height`

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref BLOCKS_APPLIED: IntCounter = register_int_counter!(
        "blocks_applied_total",
        "Blocks applied to the canonical chain"
    )
    .expect("Failed to create BLOCKS_APPLIED metric");

    pub static ref BLOCKS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "blocks_rejected_total",
        "Blocks rejected during import",
        &["reason"]
    )
    .expect("Failed to create BLOCKS_REJECTED metric");

    pub static ref REORGS: IntCounter = register_int_counter!(
        "chain_reorgs_total",
        "Canonical chain switches"
    )
    .expect("Failed to create REORGS metric");

    pub static ref SLASHINGS: IntCounter = register_int_counter!(
        "validators_slashed_total",
        "Validators slashed for equivocation"
    )
    .expect("Failed to create SLASHINGS metric");

    pub static ref CHAIN_HEIGHT: IntGauge = register_int_gauge!(
        "chain_height",
        "Height of the canonical tip"
    )
    .expect("Failed to create CHAIN_HEIGHT metric");
}

#[cfg(feature = "metrics")]
pub fn record_block_applied(height: u64) {
    BLOCKS_APPLIED.inc();
    CHAIN_HEIGHT.set(i64::try_from(height).unwrap_or(i64::MAX));
}

#[cfg(feature = "metrics")]
pub fn record_block_rejected(reason: &str) {
    BLOCKS_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_reorg() {
    REORGS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_slashing() {
    SLASHINGS.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_block_applied(_height: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_reorg() {}

#[cfg(not(feature = "metrics"))]
pub fn record_slashing() {}
