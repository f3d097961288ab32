use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Contract runtime tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Quorum used when a bounty does not name one, and for every
    /// verification contract.
    pub required_votes: u32,
    /// Stake a validator needs before its votes count.
    pub min_voter_stake: Decimal,
    /// Deadline for taking all locks of one contract operation.
    pub lock_timeout_ms: u64,
    /// Reputation gained by voters who sided with the outcome.
    pub reputation_reward_bps: u32,
    /// Reputation lost by voters who did not.
    pub reputation_penalty_bps: u32,
    /// Longest bounty a creator may open.
    pub max_bounty_duration_secs: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            required_votes: 3,
            min_voter_stake: Decimal::ONE,
            lock_timeout_ms: 5_000,
            reputation_reward_bps: 100,
            reputation_penalty_bps: 200,
            max_bounty_duration_secs: 30 * 24 * 3600,
        }
    }
}

impl ContractConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
