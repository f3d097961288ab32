use super::resource::{LockMode, ResourceId};
use shared_types::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcurrencyError {
    /// Deadline passed before the lock was granted.
    #[error("Lock timeout on {resource} after {waited_ms}ms")]
    Timeout { resource: ResourceId, waited_ms: u64 },

    /// Granting would close a wait-for cycle.
    #[error("Deadlock suspected on {resource}")]
    DeadlockSuspected { resource: ResourceId },

    /// The session was swept for missing heartbeats.
    #[error("Lock session {session} expired")]
    SessionExpired { session: u64 },

    /// The session already holds this resource.
    #[error("Resource {resource} already held by this session")]
    AlreadyHeld { resource: ResourceId },

    /// Only Upgrade guards can promote.
    #[error("Cannot upgrade {resource} held in {mode:?} mode")]
    InvalidUpgrade { resource: ResourceId, mode: LockMode },
}

impl Classify for ConcurrencyError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::DeadlockSuspected { .. } | Self::SessionExpired { .. } => {
                ErrorKind::Concurrency
            }
            Self::AlreadyHeld { .. } | Self::InvalidUpgrade { .. } => ErrorKind::Internal,
        }
    }
}

pub type ConcurrencyResult<T> = Result<T, ConcurrencyError>;
