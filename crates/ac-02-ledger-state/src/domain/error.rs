use ac_01_safe_math::MathError;
use rust_decimal::Decimal;
use shared_types::{to_hex, Address, Classify, ContractId, ErrorKind, Hash};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Insufficient balance for {}: required {required}, available {available}", to_hex(.address))]
    InsufficientBalance {
        address: Address,
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient stake for {}: required {required}, staked {staked}", to_hex(.address))]
    InsufficientStake {
        address: Address,
        required: Decimal,
        staked: Decimal,
    },

    #[error(transparent)]
    Math(#[from] MathError),

    #[error("Invalid nonce for {}: expected {expected}, got {actual}", to_hex(.address))]
    InvalidNonce {
        address: Address,
        expected: u64,
        actual: u64,
    },

    #[error("Archive {} already recorded", to_hex(.content_hash))]
    ArchiveExists { content_hash: Hash },

    #[error("Archive {} not found", to_hex(.content_hash))]
    ArchiveNotFound { content_hash: Hash },

    #[error("Archive {} is verified and immutable", to_hex(.content_hash))]
    ArchiveImmutable { content_hash: Hash },

    #[error("Contract {id} not found")]
    ContractNotFound { id: ContractId },

    #[error("Validator {} not found", to_hex(.address))]
    ValidatorNotFound { address: Address },

    #[error("Block {} not found", to_hex(.hash))]
    BlockNotFound { hash: Hash },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Classify for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientBalance { .. } | Self::InsufficientStake { .. } => {
                ErrorKind::InsufficientBalance
            }
            Self::Math(e) => e.kind(),
            Self::InvalidNonce { .. } | Self::ArchiveExists { .. } => ErrorKind::Validation,
            Self::ArchiveImmutable { .. } => ErrorKind::ContractExecution,
            Self::ArchiveNotFound { .. }
            | Self::ContractNotFound { .. }
            | Self::ValidatorNotFound { .. }
            | Self::BlockNotFound { .. } => ErrorKind::NotFound,
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
