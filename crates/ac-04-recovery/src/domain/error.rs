use shared_types::{Classify, ErrorKind};
use thiserror::Error;

/// Failures of the recovery machinery itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// Pre-state could not be captured; the operation did not run.
    #[error("Checkpoint capture failed for {operation}: {reason}")]
    SnapshotFailed { operation: String, reason: String },

    /// Rollback failed. State may be inconsistent; emergency stop engaged.
    #[error("Checkpoint restore failed for {operation}: {reason}")]
    RestoreFailed { operation: String, reason: String },

    /// Category breaker is open.
    #[error("Circuit open for {category}; retry in {retry_after_ms}ms")]
    CircuitOpen {
        category: String,
        retry_after_ms: u64,
    },

    /// A previous restore failed and nothing may mutate state.
    #[error("Emergency stop engaged")]
    EmergencyStop,
}

impl Classify for RecoveryError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Recovery
    }
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;
