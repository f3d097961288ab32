use ac_01_safe_math::MathError;
use ac_02_ledger_state::{ContractKind, ContractStatus, LedgerError};
use ac_03_concurrency::ConcurrencyError;
use ac_04_recovery::RecoveryError;
use rust_decimal::Decimal;
use shared_crypto::CryptoError;
use shared_types::{to_hex, Address, Classify, ContractId, ErrorKind, Hash, Timestamp};
use thiserror::Error;

/// Contract runtime errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Math(#[from] MathError),

    /// The contract's state machine does not allow `operation` right now.
    #[error("Contract {id} is {status}; cannot {operation}")]
    InvalidStatus {
        id: ContractId,
        status: ContractStatus,
        operation: &'static str,
    },

    #[error("Validator {} already voted on contract {id}", to_hex(.voter))]
    DuplicateVote { id: ContractId, voter: Address },

    /// Voter holds no validator record or too little stake.
    #[error("{} is not an eligible voter", to_hex(.voter))]
    NotEligibleVoter { voter: Address },

    /// Archivers may not vote on their own submission.
    #[error("{} cannot vote on its own submission to contract {id}", to_hex(.voter))]
    SelfVote { id: ContractId, voter: Address },

    #[error("Contract {id} ({kind}) does not take votes")]
    NotVotable { id: ContractId, kind: ContractKind },

    #[error("Contract {id} is a {actual}, expected {expected}")]
    WrongKind {
        id: ContractId,
        expected: ContractKind,
        actual: ContractKind,
    },

    #[error("Contract {id} deadline {deadline} has passed")]
    DeadlinePassed { id: ContractId, deadline: Timestamp },

    #[error("Invalid deadline {deadline} at {now}")]
    InvalidDeadline { deadline: Timestamp, now: Timestamp },

    /// Submitted content is not what the bounty asked for.
    #[error("Content {} does not match contract {id}", to_hex(.content_hash))]
    TargetMismatch { id: ContractId, content_hash: Hash },

    /// A bounty answer must be content nobody archived before.
    #[error("Content {} was already archived", to_hex(.content_hash))]
    DuplicateContent { content_hash: Hash },

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("{} already preserves pool {pool_id}", to_hex(.preserver))]
    AlreadyJoined { pool_id: ContractId, preserver: Address },

    #[error("Preservation pool {pool_id} is closed")]
    PoolClosed { pool_id: ContractId },

    #[error("{} is not a preserver of pool {pool_id}", to_hex(.preserver))]
    NotAPreserver { pool_id: ContractId, preserver: Address },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Two headers that do not prove a double signature.
    #[error("Invalid equivocation evidence: {reason}")]
    InvalidEvidence { reason: &'static str },

    /// No local copy to check a storage proof against.
    #[error("Content {} is not available locally", to_hex(.content_hash))]
    ContentUnavailable { content_hash: Hash },

    /// The set of entries touched kept growing while locks were taken.
    #[error("Participants of contract {id} changed during lock acquisition")]
    ParticipantsChanged { id: ContractId },

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

impl Classify for ContractError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::Math(e) => e.kind(),
            Self::Crypto(e) => e.kind(),
            Self::Concurrency(e) => e.kind(),
            Self::Recovery(e) => e.kind(),
            Self::InvalidStatus { .. }
            | Self::DuplicateVote { .. }
            | Self::NotEligibleVoter { .. }
            | Self::SelfVote { .. }
            | Self::NotVotable { .. }
            | Self::DeadlinePassed { .. }
            | Self::AlreadyJoined { .. }
            | Self::PoolClosed { .. }
            | Self::NotAPreserver { .. } => ErrorKind::ContractExecution,
            Self::WrongKind { .. }
            | Self::InvalidDeadline { .. }
            | Self::TargetMismatch { .. }
            | Self::DuplicateContent { .. }
            | Self::InvalidAmount(_)
            | Self::InvalidEvidence { .. } => ErrorKind::Validation,
            Self::ContentUnavailable { .. } => ErrorKind::NotFound,
            Self::ParticipantsChanged { .. } => ErrorKind::Concurrency,
        }
    }
}

pub type ContractResult<T> = Result<T, ContractError>;
