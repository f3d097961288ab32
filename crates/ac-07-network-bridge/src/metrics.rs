//! # Network Metrics
//!
//! - `network_messages_sent_total{kind}`
//! - `network_messages_dropped_total{kind}`

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_vec, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref MESSAGES_SENT: IntCounterVec = register_int_counter_vec!(
        "network_messages_sent_total",
        "Messages delivered to a peer queue",
        &["kind"]
    )
    .expect("Failed to create MESSAGES_SENT metric");

    pub static ref MESSAGES_DROPPED: IntCounterVec = register_int_counter_vec!(
        "network_messages_dropped_total",
        "Messages dropped because a peer queue was full or closed",
        &["kind"]
    )
    .expect("Failed to create MESSAGES_DROPPED metric");
}

#[cfg(feature = "metrics")]
pub fn record_sent(kind: &str) {
    MESSAGES_SENT.with_label_values(&[kind]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_dropped(kind: &str) {
    MESSAGES_DROPPED.with_label_values(&[kind]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_sent(_kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_dropped(_kind: &str) {}
