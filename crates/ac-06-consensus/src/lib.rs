//! # Proof of Archive Consensus
//!
//! Validators earn the right to produce blocks by archiving, not by burning
//! hashes. A validator's score blends archive quality, archive count, stake
//! share and uptime; anyone above the threshold with enough stake may
//! produce, and the next producer is drawn from the eligible set weighted by
//! score.
//!
//! ## Rules enforced on every block
//!
//! - Height is parent + 1 and the timestamp strictly increases.
//! - Declared difficulty equals the producer's score (basis points) at the
//!   parent state.
//! - No validator produces more than `max_consecutive_blocks` in a row
//!   while another validator is eligible.
//! - Signing two blocks at one height burns `slash_fraction` of stake once
//!   a report carrying both headers is included in a block.
//! - The declared state root matches the ledger after execution.
//!
//! Fork choice is longest chain, earlier timestamp on ties.

pub mod domain;
pub mod execution;
pub mod metrics;
pub mod service;
pub mod validation;

pub use domain::{
    ChainTip, ConsensusConfig, ConsensusError, ConsensusResult, EquivocationEvidence,
    QualityWeights, ScoreBreakdown, ScoreWeights, ValidatorState,
};
pub use service::{ConsensusDependencies, ConsensusEngine, ImportOutcome, ProducedBlock};
pub use validation::BlockValidator;
