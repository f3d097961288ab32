//! # Chain Events
//!
//! Everything published on the bus. Contract events are published only after
//! the critical section that produced them has committed, so a subscriber
//! never sees an event for a change that was rolled back.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, ContractId, Hash, VoteChoice};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    // =========================================================================
    // CONTRACTS
    // =========================================================================
    ContractCreated {
        contract_id: ContractId,
        /// `bounty`, `verification` or `preservation_pool`.
        kind: String,
        creator: Address,
    },

    /// An archive was offered as the answer to a bounty.
    SubmissionReceived {
        contract_id: ContractId,
        archiver: Address,
        content_hash: Hash,
    },

    /// A vote was recorded. Carries the running tally.
    VerificationVote {
        contract_id: ContractId,
        voter: Address,
        choice: VoteChoice,
        valid_votes: u32,
        total_votes: u32,
        required_votes: u32,
    },

    /// Quorum reached and the outcome fixed. Published exactly once per
    /// contract.
    VerificationResultCalculated {
        contract_id: ContractId,
        outcome: VoteChoice,
        valid_votes: u32,
        total_votes: u32,
    },

    BountyPaid {
        contract_id: ContractId,
        recipient: Address,
        amount: Amount,
    },

    BountyRefunded {
        contract_id: ContractId,
        creator: Address,
        amount: Amount,
    },

    ContractExpired {
        contract_id: ContractId,
    },

    PoolContribution {
        pool_id: ContractId,
        contributor: Address,
        amount: Amount,
        balance: Amount,
    },

    PreserverJoined {
        pool_id: ContractId,
        preserver: Address,
    },

    PreservationRewarded {
        pool_id: ContractId,
        preserver: Address,
        amount: Amount,
        epoch: u64,
    },

    // =========================================================================
    // ARCHIVES
    // =========================================================================
    ArchiveRecorded {
        content_hash: Hash,
        archiver: Address,
        block_number: u64,
    },

    ArchiveVerified {
        content_hash: Hash,
        verified: bool,
    },

    // =========================================================================
    // CONSENSUS
    // =========================================================================
    BlockApplied {
        height: u64,
        hash: Hash,
        validator: Address,
        tx_count: usize,
    },

    BlockRejected {
        hash: Hash,
        reason: String,
    },

    ChainReorganized {
        old_tip: Hash,
        new_tip: Hash,
        /// Canonical blocks replaced.
        depth: u64,
    },

    ValidatorSlashed {
        validator: Address,
        amount: Amount,
        height: u64,
    },

    // =========================================================================
    // MEMPOOL
    // =========================================================================
    TransactionAccepted {
        hash: Hash,
        sender: Address,
    },

    // =========================================================================
    // CRITICAL EVENTS
    // =========================================================================
    /// Requires operator attention (e.g. emergency stop engaged).
    CriticalError { component: String, error: String },
}

impl ChainEvent {
    /// Topic for filtering.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::ContractCreated { .. }
            | Self::SubmissionReceived { .. }
            | Self::VerificationVote { .. }
            | Self::VerificationResultCalculated { .. }
            | Self::BountyPaid { .. }
            | Self::BountyRefunded { .. }
            | Self::ContractExpired { .. }
            | Self::PoolContribution { .. }
            | Self::PreserverJoined { .. }
            | Self::PreservationRewarded { .. } => EventTopic::Contracts,
            Self::ArchiveRecorded { .. } | Self::ArchiveVerified { .. } => EventTopic::Archives,
            Self::BlockApplied { .. }
            | Self::BlockRejected { .. }
            | Self::ChainReorganized { .. }
            | Self::ValidatorSlashed { .. } => EventTopic::Consensus,
            Self::TransactionAccepted { .. } => EventTopic::Mempool,
            Self::CriticalError { .. } => EventTopic::Critical,
        }
    }

    /// Contract the event concerns, if any.
    #[must_use]
    pub fn contract_id(&self) -> Option<ContractId> {
        match self {
            Self::ContractCreated { contract_id, .. }
            | Self::SubmissionReceived { contract_id, .. }
            | Self::VerificationVote { contract_id, .. }
            | Self::VerificationResultCalculated { contract_id, .. }
            | Self::BountyPaid { contract_id, .. }
            | Self::BountyRefunded { contract_id, .. }
            | Self::ContractExpired { contract_id } => Some(*contract_id),
            Self::PoolContribution { pool_id, .. }
            | Self::PreserverJoined { pool_id, .. }
            | Self::PreservationRewarded { pool_id, .. } => Some(*pool_id),
            _ => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Contracts,
    Archives,
    Consensus,
    Mempool,
    Critical,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Restrict to events about one contract.
    pub contract_id: Option<ContractId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            contract_id: None,
        }
    }

    /// Events about a single contract.
    #[must_use]
    pub fn contract(contract_id: ContractId) -> Self {
        Self {
            topics: vec![EventTopic::Contracts],
            contract_id: Some(contract_id),
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ChainEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let contract_match = match self.contract_id {
            None => true,
            Some(id) => event.contract_id() == Some(id),
        };

        topic_match && contract_match
    }
}
