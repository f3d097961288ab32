//! # Contract Instance Data
//!
//! The ledger owns every contract instance in an arena keyed by
//! [`ContractId`]. Behavior lives in the contract runtime; this module only
//! holds the state each kind carries.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, ContractId, Hash, Timestamp, VoteChoice};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lifecycle of a vote-resolved contract.
///
/// ```text
/// Open ──submission──► InProgress ──quorum──► Completed | Rejected
///   └──────────────────────┴────deadline────► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    Open,
    InProgress,
    Completed,
    Rejected,
    Expired,
}

impl ContractStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validator votes on one contract, at most one per validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    votes: BTreeMap<Address, VoteChoice>,
}

impl VoteTally {
    /// False if `voter` already voted; the earlier vote stands.
    pub fn record(&mut self, voter: Address, choice: VoteChoice) -> bool {
        if self.votes.contains_key(&voter) {
            return false;
        }
        self.votes.insert(voter, choice);
        true
    }

    pub fn total(&self) -> u32 {
        u32::try_from(self.votes.len()).unwrap_or(u32::MAX)
    }

    pub fn valid(&self) -> u32 {
        let approvals = self.votes.values().filter(|c| c.is_valid()).count();
        u32::try_from(approvals).unwrap_or(u32::MAX)
    }

    pub fn quorum_reached(&self, required: u32) -> bool {
        self.total() >= required
    }

    /// Strict majority of approvals over all votes cast.
    pub fn outcome(&self) -> VoteChoice {
        let valid = u64::from(self.valid());
        let total = u64::from(self.total());
        VoteChoice::from_valid(valid * 2 > total)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &VoteChoice)> {
        self.votes.iter()
    }
}

/// An archive offered as the answer to a bounty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub archiver: Address,
    pub content_hash: Hash,
    pub tx_hash: Hash,
    pub submitted_at: Timestamp,
}

/// Escrowed reward for archiving a specific piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyContract {
    pub id: ContractId,
    pub creator: Address,
    pub reward: Amount,
    pub target_content_hash: Hash,
    pub deadline: Timestamp,
    pub required_votes: u32,
    pub status: ContractStatus,
    pub submission: Option<Submission>,
    pub tally: VoteTally,
    pub created_at: Timestamp,
}

/// Validator vote on whether an archive is genuine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationContract {
    pub id: ContractId,
    pub content_hash: Hash,
    pub archiver: Address,
    pub required_votes: u32,
    pub status: ContractStatus,
    pub tally: VoteTally,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolStatus {
    Active,
    /// Drained; accepts nothing further.
    Closed,
}

/// Funds paid out per epoch to nodes proving they still hold the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservationPool {
    pub id: ContractId,
    pub creator: Address,
    pub content_hash: Hash,
    pub balance: Amount,
    pub epoch_reward: Amount,
    pub preservers: BTreeSet<Address>,
    /// Preservers that answered a challenge during the current epoch.
    pub epoch_proofs: BTreeSet<Address>,
    pub epoch: u64,
    pub status: PoolStatus,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    Bounty,
    Verification,
    PreservationPool,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bounty => "bounty",
            Self::Verification => "verification",
            Self::PreservationPool => "preservation_pool",
        };
        f.write_str(s)
    }
}

/// Tagged union over the built-in contract kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractInstance {
    Bounty(BountyContract),
    Verification(VerificationContract),
    PreservationPool(PreservationPool),
}

impl ContractInstance {
    pub fn id(&self) -> ContractId {
        match self {
            Self::Bounty(c) => c.id,
            Self::Verification(c) => c.id,
            Self::PreservationPool(c) => c.id,
        }
    }

    pub fn kind(&self) -> ContractKind {
        match self {
            Self::Bounty(_) => ContractKind::Bounty,
            Self::Verification(_) => ContractKind::Verification,
            Self::PreservationPool(_) => ContractKind::PreservationPool,
        }
    }

    /// Vote-resolved status, `None` for pools.
    pub fn status(&self) -> Option<ContractStatus> {
        match self {
            Self::Bounty(c) => Some(c.status),
            Self::Verification(c) => Some(c.status),
            Self::PreservationPool(_) => None,
        }
    }

    pub fn tally(&self) -> Option<&VoteTally> {
        match self {
            Self::Bounty(c) => Some(&c.tally),
            Self::Verification(c) => Some(&c.tally),
            Self::PreservationPool(_) => None,
        }
    }

    /// Address whose account the contract pays out to, if any.
    pub fn beneficiary(&self) -> Option<Address> {
        match self {
            Self::Bounty(c) => c.submission.as_ref().map(|s| s.archiver),
            Self::Verification(c) => Some(c.archiver),
            Self::PreservationPool(_) => None,
        }
    }
}
