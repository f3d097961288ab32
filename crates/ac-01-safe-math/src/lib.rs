//! # Safe Arithmetic
//!
//! Every token-affecting computation goes through [`SafeMath`]. Results are
//! bounded to `[0, max_supply]`; anything outside fails with
//! [`MathError::Overflow`] or [`MathError::Underflow`] instead of wrapping.
//!
//! ## Rounding
//!
//! Division and percentage results are rounded half-to-even at
//! [`TOKEN_SCALE`] decimal places.

pub mod error;
pub mod safe_math;

pub use error::{MathError, MathResult};
pub use safe_math::{SafeMath, DEFAULT_MAX_SUPPLY, TOKEN_SCALE};
