//! # Ledger Entities
//!
//! Accounts are never deleted, only zeroed. Archive records freeze once
//! verified. Validator records hold the persistent counters the PoA score is
//! derived from; the score itself is never stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, ContractId, Hash, Timestamp};
use std::collections::BTreeSet;

// =============================================================================
// ACCOUNTS
// =============================================================================

/// Balance, stake and reputation of one address.
///
/// Fields are private: every mutation goes through `LedgerTxn`, which routes
/// value changes through `SafeMath`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    pub(crate) balance: Amount,
    pub(crate) staked: Amount,
    /// Community reputation in basis points, 0..=10_000.
    pub(crate) reputation_bps: u32,
    /// Next nonce this account must use.
    pub(crate) nonce: u64,
}

/// Reputation every account starts with (0.5).
pub const DEFAULT_REPUTATION_BPS: u32 = 5_000;

impl Account {
    pub(crate) fn new() -> Self {
        Self {
            reputation_bps: DEFAULT_REPUTATION_BPS,
            ..Default::default()
        }
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn staked(&self) -> Amount {
        self.staked
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Reputation in [0, 1].
    pub fn reputation(&self) -> f64 {
        f64::from(self.reputation_bps) / 10_000.0
    }

    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.staked.is_zero()
    }
}

// =============================================================================
// ARCHIVES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub content_hash: Hash,
    pub metadata_hash: Hash,
    pub archiver: Address,
    /// Hash of the Archive transaction that created this record.
    pub tx_hash: Hash,
    pub block_number: u64,
    pub submitted_at: Timestamp,
    pub verification_votes: u32,
    pub verified: bool,
    /// Share of approving votes when verification finalized, in basis points.
    pub quality_bps: u32,
    /// Verification contract deciding this record.
    pub verification_contract: Option<ContractId>,
}

// =============================================================================
// VALIDATORS
// =============================================================================

/// Persistent inputs to the Proof of Archive score.
///
/// Created on first stake or first archive submission, whichever comes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub address: Address,
    pub registered_at: Timestamp,
    /// Archives submitted by this address.
    pub archives_submitted: u64,
    /// Of those, content hashes no one had submitted before.
    pub unique_archives: u64,
    /// Of those, submissions carrying a metadata hash.
    pub complete_metadata: u64,
    /// Of those, archives that passed verification.
    pub archives_verified: u64,
    /// Availability in [0, 1], moving average over expected production slots.
    pub uptime: f64,
    pub consecutive_blocks: u32,
    pub blocks_produced: u64,
    /// Timestamp of the last block this validator produced.
    pub last_block_at: Option<Timestamp>,
    pub last_active: Timestamp,
    pub total_slashed: Amount,
    /// Heights this validator was already punished for.
    pub slashed_heights: BTreeSet<u64>,
}

impl ValidatorRecord {
    pub fn new(address: Address, now: Timestamp) -> Self {
        Self {
            address,
            registered_at: now,
            archives_submitted: 0,
            unique_archives: 0,
            complete_metadata: 0,
            archives_verified: 0,
            uptime: 1.0,
            consecutive_blocks: 0,
            blocks_produced: 0,
            last_block_at: None,
            last_active: now,
            total_slashed: Decimal::ZERO,
            slashed_heights: BTreeSet::new(),
        }
    }

    fn ratio(part: u64, whole: u64) -> f64 {
        if whole == 0 {
            0.0
        } else {
            (part as f64 / whole as f64).clamp(0.0, 1.0)
        }
    }

    pub fn uniqueness(&self) -> f64 {
        Self::ratio(self.unique_archives, self.archives_submitted)
    }

    pub fn metadata_completeness(&self) -> f64 {
        Self::ratio(self.complete_metadata, self.archives_submitted)
    }

    pub fn verification_rate(&self) -> f64 {
        Self::ratio(self.archives_verified, self.archives_submitted)
    }
}

// =============================================================================
// COUNTERS
// =============================================================================

/// Ledger-wide bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerCounters {
    pub next_contract_id: ContractId,
    /// Tokens destroyed by slashing.
    pub burned: Amount,
    /// Producer of the latest applied block.
    pub last_producer: Option<Address>,
    /// Height of the latest applied block.
    pub height: u64,
}
