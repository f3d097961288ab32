//! # Proof of Archive Score
//!
//! ```text
//! score = 0.4*quality + 0.3*quantity + 0.2*stake_ratio + 0.1*uptime
//! ```
//!
//! - `quality` blends uniqueness, metadata completeness, verification rate
//!   and community reputation.
//! - `quantity` is `ln(1 + archives) / ln(1 + saturation)`, capped at 1.
//! - `stake_ratio` is stake over the largest stake in the network.
//! - `uptime` is the moving average kept on the validator record.
//!
//! Scores are derived on demand from ledger counters and never stored.

use super::config::ConsensusConfig;
use ac_02_ledger_state::{LedgerView, ValidatorRecord};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared_types::Address;
use std::fmt;

/// Score components, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub quality: f64,
    pub quantity: f64,
    pub stake_ratio: f64,
    pub uptime: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    /// Score in basis points, as declared in block headers.
    pub fn bps(&self) -> u64 {
        to_bps(self.total)
    }
}

pub fn to_bps(score: f64) -> u64 {
    (score.clamp(0.0, 1.0) * 10_000.0).round() as u64
}

pub fn quality(record: &ValidatorRecord, reputation: f64, config: &ConsensusConfig) -> f64 {
    let w = &config.quality_weights;
    let q = w.uniqueness * record.uniqueness()
        + w.metadata * record.metadata_completeness()
        + w.verification * record.verification_rate()
        + w.reputation * reputation.clamp(0.0, 1.0);
    q.clamp(0.0, 1.0)
}

/// Logarithmic diminishing returns on archive count.
pub fn quantity(archives: u64, saturation: u64) -> f64 {
    if saturation == 0 {
        return 1.0;
    }
    let q = (archives as f64).ln_1p() / (saturation as f64).ln_1p();
    q.clamp(0.0, 1.0)
}

pub fn stake_ratio(stake: Decimal, max_stake: Decimal) -> f64 {
    if max_stake <= Decimal::ZERO || stake <= Decimal::ZERO {
        return 0.0;
    }
    (stake / max_stake).to_f64().unwrap_or(0.0).clamp(0.0, 1.0)
}

pub fn breakdown(
    record: &ValidatorRecord,
    stake: Decimal,
    max_stake: Decimal,
    reputation: f64,
    config: &ConsensusConfig,
) -> ScoreBreakdown {
    let w = &config.weights;
    let quality = quality(record, reputation, config);
    let quantity = quantity(record.archives_submitted, config.quantity_saturation);
    let stake_ratio = stake_ratio(stake, max_stake);
    let uptime = record.uptime.clamp(0.0, 1.0);
    let total = (w.quality * quality
        + w.quantity * quantity
        + w.stake * stake_ratio
        + w.uptime * uptime)
        .clamp(0.0, 1.0);
    ScoreBreakdown {
        quality,
        quantity,
        stake_ratio,
        uptime,
        total,
    }
}

/// Score of `address` against the ledger as it stands. `None` if it has no
/// validator record.
pub fn score_of(
    view: &LedgerView<'_>,
    address: &Address,
    config: &ConsensusConfig,
) -> Option<ScoreBreakdown> {
    let record = view.validator(address)?;
    Some(breakdown(
        record,
        view.staked(address),
        view.max_stake(),
        view.reputation(address),
        config,
    ))
}

// =============================================================================
// VALIDATOR STATE
// =============================================================================

/// Where a validator stands for the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorState {
    /// Below the score threshold or the minimum stake.
    Ineligible,
    /// May be selected.
    Eligible,
    /// Produced the latest block and may produce again.
    Active,
    /// Produced the maximum consecutive blocks; sits out the next one.
    CoolingDown,
}

impl fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ineligible => "ineligible",
            Self::Eligible => "eligible",
            Self::Active => "active",
            Self::CoolingDown => "cooling_down",
        };
        f.write_str(s)
    }
}

pub fn meets_requirements(
    view: &LedgerView<'_>,
    address: &Address,
    score: f64,
    config: &ConsensusConfig,
) -> bool {
    score >= config.min_score_threshold && view.staked(address) >= config.min_validator_stake
}

pub fn validator_state(
    view: &LedgerView<'_>,
    address: &Address,
    config: &ConsensusConfig,
) -> ValidatorState {
    let Some(score) = score_of(view, address, config) else {
        return ValidatorState::Ineligible;
    };
    if !meets_requirements(view, address, score.total, config) {
        return ValidatorState::Ineligible;
    }
    if view.counters().last_producer != Some(*address) {
        return ValidatorState::Eligible;
    }
    let streak = view.validator(address).map_or(0, |v| v.consecutive_blocks);
    if streak >= config.max_consecutive_blocks {
        ValidatorState::CoolingDown
    } else {
        ValidatorState::Active
    }
}

/// Validators meeting threshold and stake, ordered by address.
pub fn eligible_validators(view: &LedgerView<'_>, config: &ConsensusConfig) -> Vec<(Address, f64)> {
    view.validators()
        .filter_map(|record| {
            let score = score_of(view, &record.address, config)?.total;
            meets_requirements(view, &record.address, score, config)
                .then_some((record.address, score))
        })
        .collect()
}
