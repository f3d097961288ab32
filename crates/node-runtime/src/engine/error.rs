//! Engine boundary errors.
//!
//! Component errors pass through unchanged so their kind survives. Anything
//! unexpected becomes [`EngineError::Internal`] with its cause chain, which
//! [`EngineError::to_api_error`] never reveals to callers.

use crate::mempool::MempoolError;
use ac_02_ledger_state::LedgerError;
use ac_05_contracts::ContractError;
use ac_06_consensus::ConsensusError;
use ac_07_network_bridge::NetworkError;
use shared_crypto::CryptoError;
use shared_types::{to_hex, Address, ApiError, Classify, ErrorKind, Hash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("No archive with content hash {}", to_hex(.0))]
    ArchiveNotFound(Hash),

    #[error("{} is not a validator", to_hex(.0))]
    ValidatorNotFound(Address),

    /// Producing or voting needs a validator key.
    #[error("Node has no validator key")]
    NotValidator,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Classify for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Consensus(e) => e.kind(),
            Self::Contract(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::Crypto(e) => e.kind(),
            Self::Mempool(e) => e.kind(),
            Self::Network(e) => e.kind(),
            Self::ArchiveNotFound(_) | Self::ValidatorNotFound(_) => ErrorKind::NotFound,
            Self::NotValidator => ErrorKind::Validation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl EngineError {
    /// What the API layer may show: kind plus message, nothing internal.
    pub fn to_api_error(&self) -> ApiError {
        match self.kind() {
            ErrorKind::Internal => ApiError::new(ErrorKind::Internal, "internal error"),
            kind => ApiError::new(kind, self.to_string()),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
