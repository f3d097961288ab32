use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Weights of the four score components. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub quality: f64,
    pub quantity: f64,
    pub stake: f64,
    pub uptime: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            quality: 0.4,
            quantity: 0.3,
            stake: 0.2,
            uptime: 0.1,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.quality + self.quantity + self.stake + self.uptime
    }

    pub fn is_normalized(&self) -> bool {
        let parts = [self.quality, self.quantity, self.stake, self.uptime];
        parts.iter().all(|w| *w >= 0.0) && (self.sum() - 1.0).abs() < 1e-9
    }
}

/// Blend of the quality sub-signals. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub uniqueness: f64,
    pub metadata: f64,
    pub verification: f64,
    pub reputation: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            uniqueness: 0.3,
            metadata: 0.2,
            verification: 0.3,
            reputation: 0.2,
        }
    }
}

impl QualityWeights {
    pub fn is_normalized(&self) -> bool {
        let parts = [self.uniqueness, self.metadata, self.verification, self.reputation];
        parts.iter().all(|w| *w >= 0.0) && (parts.iter().sum::<f64>() - 1.0).abs() < 1e-9
    }
}

/// Proof of Archive parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub weights: ScoreWeights,
    pub quality_weights: QualityWeights,
    /// Validators scoring below this are never selected and may not produce.
    pub min_score_threshold: f64,
    pub max_consecutive_blocks: u32,
    /// Chance of forcing the last producer out of the draw even below the cap.
    pub rotation_probability: f64,
    /// Archive count at which the quantity component saturates.
    pub quantity_saturation: u64,
    pub min_validator_stake: Decimal,
    /// Anti-spam gap between two blocks of the same validator.
    pub min_block_interval_secs: u64,
    /// How far block and transaction timestamps may run ahead of the clock.
    pub max_future_drift_secs: u64,
    pub min_fee: Decimal,
    pub max_txs_per_block: usize,
    /// Share of stake burned for equivocation.
    pub slash_fraction: Decimal,
    /// Blocks whose post-state is retained for reorgs.
    pub max_reorg_depth: u64,
    /// Weight of one observation in the uptime moving average.
    pub uptime_sample_weight: f64,
    pub block_lock_timeout_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            quality_weights: QualityWeights::default(),
            min_score_threshold: 0.3,
            max_consecutive_blocks: 2,
            rotation_probability: 0.1,
            quantity_saturation: 1_000,
            min_validator_stake: Decimal::TEN,
            min_block_interval_secs: 5,
            max_future_drift_secs: 15,
            min_fee: Decimal::new(1, 3),
            max_txs_per_block: 1_000,
            slash_fraction: Decimal::new(1, 1),
            max_reorg_depth: 64,
            uptime_sample_weight: 0.05,
            block_lock_timeout_ms: 10_000,
        }
    }
}

impl ConsensusConfig {
    pub fn block_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.block_lock_timeout_ms)
    }
}
