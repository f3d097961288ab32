//! # Contract Metrics
//!
//! - `contracts_created_total{kind}`
//! - `contract_votes_total{choice}`
//! - `contracts_resolved_total{status}`
//! - `contract_lock_widenings_total`

use ac_02_ledger_state::{ContractKind, ContractStatus};
use shared_types::VoteChoice;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref CONTRACTS_CREATED: IntCounterVec = register_int_counter_vec!(
        "contracts_created_total",
        "Contract instances created",
        &["kind"]
    )
    .expect("Failed to create CONTRACTS_CREATED metric");

    pub static ref VOTES: IntCounterVec = register_int_counter_vec!(
        "contract_votes_total",
        "Votes recorded on contracts",
        &["choice"]
    )
    .expect("Failed to create VOTES metric");

    pub static ref RESOLVED: IntCounterVec = register_int_counter_vec!(
        "contracts_resolved_total",
        "Contracts that reached a terminal status",
        &["status"]
    )
    .expect("Failed to create RESOLVED metric");

    pub static ref LOCK_WIDENINGS: IntCounter = register_int_counter!(
        "contract_lock_widenings_total",
        "Lock sets re-acquired because participants changed while waiting"
    )
    .expect("Failed to create LOCK_WIDENINGS metric");
}

#[cfg(feature = "metrics")]
pub fn record_contract_created(kind: ContractKind) {
    CONTRACTS_CREATED
        .with_label_values(&[&kind.to_string()])
        .inc();
}

#[cfg(feature = "metrics")]
pub fn record_vote(choice: VoteChoice) {
    let label = if choice.is_valid() { "approve" } else { "reject" };
    VOTES.with_label_values(&[label]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_resolution(status: ContractStatus) {
    RESOLVED.with_label_values(&[status.as_str()]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_lock_widening() {
    LOCK_WIDENINGS.inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_contract_created(_kind: ContractKind) {}

#[cfg(not(feature = "metrics"))]
pub fn record_vote(_choice: VoteChoice) {}

#[cfg(not(feature = "metrics"))]
pub fn record_resolution(_status: ContractStatus) {}

#[cfg(not(feature = "metrics"))]
pub fn record_lock_widening() {}
