//! # Error Kinds
//!
//! Every crate keeps its own closed error enum. This module holds the shared
//! classification those enums map onto, and the envelope the API boundary
//! hands to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed taxonomy of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed or unsigned input. Never retried.
    Validation,
    /// Sender cannot cover the value or fee moved.
    InsufficientBalance,
    /// Result would exceed the supply ceiling.
    Overflow,
    /// Result would go negative.
    Underflow,
    /// Contract state machine violation (duplicate vote, wrong status).
    ContractExecution,
    /// Validator ineligible, rotation violated, block rejected.
    Consensus,
    /// Lock timeout or suspected deadlock. Retried with backoff.
    Concurrency,
    /// Checkpoint restore failed. Triggers emergency stop.
    Recovery,
    /// Requested entity does not exist.
    NotFound,
    /// Anything unexpected. Wrapped at the boundary with its cause.
    Internal,
}

impl ErrorKind {
    /// Only lock contention is worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Concurrency)
    }

    /// Whether a failure of this kind counts against a circuit breaker.
    ///
    /// Caller mistakes (bad input, insufficient funds, rule violations) are
    /// answered correctly by the system and must not open a breaker.
    pub fn counts_as_fault(self) -> bool {
        matches!(self, Self::Concurrency | Self::Recovery | Self::Internal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::InsufficientBalance => "insufficient_balance_error",
            Self::Overflow => "overflow_error",
            Self::Underflow => "underflow_error",
            Self::ContractExecution => "contract_execution_error",
            Self::Consensus => "consensus_error",
            Self::Concurrency => "concurrency_error",
            Self::Recovery => "recovery_error",
            Self::NotFound => "not_found",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a crate error onto the shared taxonomy.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Structured error returned across the API boundary.
///
/// Carries the kind and a human-readable message only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}
