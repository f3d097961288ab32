use rust_decimal::Decimal;
use shared_types::{Classify, ErrorKind};
use thiserror::Error;

/// Arithmetic violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    /// Result above the supply ceiling, or beyond decimal range.
    #[error("Overflow: {operation} result exceeds ceiling {ceiling}")]
    Overflow { operation: &'static str, ceiling: Decimal },

    /// Result below zero.
    #[error("Underflow: {operation} result would be negative")]
    Underflow { operation: &'static str },

    #[error("Division by zero")]
    DivisionByZero,

    /// Operand itself is negative or above the ceiling.
    #[error("Invalid operand for {operation}: {value}")]
    InvalidOperand {
        operation: &'static str,
        value: Decimal,
    },
}

impl Classify for MathError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Overflow { .. } => ErrorKind::Overflow,
            Self::Underflow { .. } => ErrorKind::Underflow,
            Self::DivisionByZero | Self::InvalidOperand { .. } => ErrorKind::Validation,
        }
    }
}

pub type MathResult<T> = Result<T, MathError>;
