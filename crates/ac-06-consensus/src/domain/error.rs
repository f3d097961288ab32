use ac_02_ledger_state::LedgerError;
use ac_03_concurrency::ConcurrencyError;
use ac_04_recovery::RecoveryError;
use ac_05_contracts::ContractError;
use shared_crypto::CryptoError;
use shared_types::{to_hex, Address, Classify, ErrorKind, Hash, Timestamp};
use thiserror::Error;

/// Consensus error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    // =========================================================================
    // STRUCTURE & CONTINUITY
    // =========================================================================
    #[error("Unknown parent block: {}", to_hex(.0))]
    UnknownParent(Hash),

    #[error("Invalid block height: expected {expected}, got {actual}")]
    InvalidHeight { expected: u64, actual: u64 },

    #[error("Invalid timestamp: block {block} <= parent {parent}")]
    InvalidTimestamp { block: Timestamp, parent: Timestamp },

    #[error("Timestamp too far in future: {timestamp}, current is {current}")]
    FutureTimestamp { timestamp: Timestamp, current: Timestamp },

    #[error("Too many transactions: {count} > {limit}")]
    TooManyTransactions { count: usize, limit: usize },

    #[error("Genesis block cannot have parent")]
    GenesisWithParent,

    #[error("Missing genesis block")]
    MissingGenesis,

    #[error("Merkle root mismatch: declared {}, computed {}", to_hex(.declared), to_hex(.computed))]
    MerkleRootMismatch { declared: Hash, computed: Hash },

    #[error("State root mismatch: declared {}, computed {}", to_hex(.declared), to_hex(.computed))]
    StateRootMismatch { declared: Hash, computed: Hash },

    #[error("Reorg depth {depth} exceeds limit {limit}")]
    ReorgTooDeep { depth: u64, limit: u64 },

    /// The block, or one of its ancestors, already failed validation.
    #[error("Block {} is invalid or descends from an invalid block", to_hex(.0))]
    KnownInvalid(Hash),

    /// Post-state of a fork point is no longer retained.
    #[error("No retained state for block {}", to_hex(.0))]
    StateUnavailable(Hash),

    // =========================================================================
    // AUTHORITY
    // =========================================================================
    #[error("Invalid block signature: {0}")]
    InvalidSignature(CryptoError),

    #[error("Validator {} score {score:.3} below threshold {threshold}", to_hex(.validator))]
    BelowThreshold {
        validator: Address,
        score: f64,
        threshold: f64,
    },

    #[error("Validator {} produced {streak} blocks in a row; rotation required", to_hex(.validator))]
    RotationViolated { validator: Address, streak: u32 },

    #[error("Validator {} stake below minimum", to_hex(.validator))]
    InsufficientStake { validator: Address },

    #[error("Validator {} produced again after {elapsed}s, minimum gap {required}s", to_hex(.validator))]
    BlockTooSoon {
        validator: Address,
        elapsed: u64,
        required: u64,
    },

    #[error("Declared difficulty {declared} does not match score {expected}")]
    DifficultyMismatch { declared: u64, expected: u64 },

    #[error("No eligible validator")]
    NoEligibleValidator,

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================
    #[error("Transaction {index} has an invalid signature: {source}")]
    TransactionSignature { index: usize, source: CryptoError },

    #[error("Transaction {index} fee below minimum")]
    FeeTooLow { index: usize },

    #[error("Transaction {index} timestamp {timestamp} is ahead of block time {block_time}")]
    TransactionFromFuture {
        index: usize,
        timestamp: Timestamp,
        block_time: Timestamp,
    },

    #[error("Transaction {index} failed: {source}")]
    Transaction { index: usize, source: ContractError },

    /// Contract bookkeeping run at the end of every block.
    #[error("Block finalization failed: {0}")]
    Finalization(ContractError),

    // =========================================================================
    // COLLABORATORS
    // =========================================================================
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

impl ConsensusError {
    /// Short label for logs and the rejected-blocks metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownParent(_) => "unknown_parent",
            Self::InvalidHeight { .. } => "invalid_height",
            Self::InvalidTimestamp { .. } | Self::FutureTimestamp { .. } => "timestamp",
            Self::TooManyTransactions { .. } => "too_many_transactions",
            Self::GenesisWithParent | Self::MissingGenesis => "genesis",
            Self::MerkleRootMismatch { .. } => "merkle_root",
            Self::StateRootMismatch { .. } => "state_root",
            Self::ReorgTooDeep { .. } | Self::StateUnavailable(_) => "reorg_depth",
            Self::KnownInvalid(_) => "known_invalid",
            Self::InvalidSignature(_) => "signature",
            Self::BelowThreshold { .. }
            | Self::RotationViolated { .. }
            | Self::InsufficientStake { .. }
            | Self::BlockTooSoon { .. }
            | Self::DifficultyMismatch { .. }
            | Self::NoEligibleValidator => "authority",
            Self::TransactionSignature { .. }
            | Self::FeeTooLow { .. }
            | Self::TransactionFromFuture { .. }
            | Self::Transaction { .. } => "transaction",
            Self::Finalization(_) => "finalization",
            Self::Ledger(_) => "ledger",
            Self::Concurrency(_) => "concurrency",
            Self::Recovery(_) => "recovery",
        }
    }
}

impl ConsensusError {
    /// Whether the block itself is bad, so it and its descendants can be
    /// refused for good. Failures that depend on the local clock, on what
    /// this node has stored, or on lock and checkpoint trouble are not.
    pub fn is_block_fault(&self) -> bool {
        match self {
            Self::FutureTimestamp { .. }
            | Self::UnknownParent(_)
            | Self::MissingGenesis
            | Self::StateUnavailable(_)
            | Self::ReorgTooDeep { .. }
            | Self::KnownInvalid(_)
            | Self::Ledger(_)
            | Self::Concurrency(_)
            | Self::Recovery(_) => false,
            other => !matches!(
                other.kind(),
                ErrorKind::Concurrency | ErrorKind::Recovery | ErrorKind::Internal
            ),
        }
    }
}

impl Classify for ConsensusError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transaction { source, .. } | Self::Finalization(source) => source.kind(),
            Self::TransactionSignature { .. }
            | Self::FeeTooLow { .. }
            | Self::TransactionFromFuture { .. } => ErrorKind::Validation,
            Self::Ledger(e) => e.kind(),
            Self::Concurrency(e) => e.kind(),
            Self::Recovery(e) => e.kind(),
            _ => ErrorKind::Consensus,
        }
    }
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_intrinsic_failures_are_block_faults() {
        assert!(ConsensusError::StateRootMismatch {
            declared: [1; 32],
            computed: [2; 32],
        }
        .is_block_fault());
        assert!(ConsensusError::InsufficientStake { validator: [1; 20] }.is_block_fault());

        assert!(!ConsensusError::FutureTimestamp {
            timestamp: 100,
            current: 10,
        }
        .is_block_fault());
        assert!(!ConsensusError::StateUnavailable([1; 32]).is_block_fault());
        assert!(!ConsensusError::Concurrency(ConcurrencyError::SessionExpired { session: 1 })
            .is_block_fault());
        assert!(!ConsensusError::Transaction {
            index: 0,
            source: ContractError::ParticipantsChanged { id: 1 },
        }
        .is_block_fault());
    }
}
