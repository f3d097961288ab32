use crate::error::{MathError, MathResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Decimal places kept after division and percentage operations.
pub const TOKEN_SCALE: u32 = 18;

/// One billion tokens.
pub const DEFAULT_MAX_SUPPLY: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Checked arithmetic bounded by a supply ceiling.
///
/// Cheap to copy; hand one to every component that moves value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeMath {
    max_supply: Decimal,
}

impl Default for SafeMath {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUPPLY)
    }
}

impl SafeMath {
    pub fn new(max_supply: Decimal) -> Self {
        Self { max_supply }
    }

    pub fn max_supply(&self) -> Decimal {
        self.max_supply
    }

    fn check_operand(&self, operation: &'static str, value: Decimal) -> MathResult<()> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MathError::InvalidOperand { operation, value });
        }
        Ok(())
    }

    fn bound(&self, operation: &'static str, value: Decimal) -> MathResult<Decimal> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MathError::Underflow { operation });
        }
        if value > self.max_supply {
            return Err(MathError::Overflow {
                operation,
                ceiling: self.max_supply,
            });
        }
        Ok(value)
    }

    fn overflow(&self, operation: &'static str) -> MathError {
        MathError::Overflow {
            operation,
            ceiling: self.max_supply,
        }
    }

    pub fn safe_add(&self, a: Decimal, b: Decimal) -> MathResult<Decimal> {
        self.check_operand("add", a)?;
        self.check_operand("add", b)?;
        let sum = a.checked_add(b).ok_or_else(|| self.overflow("add"))?;
        self.bound("add", sum)
    }

    pub fn safe_sub(&self, a: Decimal, b: Decimal) -> MathResult<Decimal> {
        self.check_operand("sub", a)?;
        self.check_operand("sub", b)?;
        let diff = a.checked_sub(b).ok_or(MathError::Underflow { operation: "sub" })?;
        self.bound("sub", diff)
    }

    pub fn safe_mul(&self, a: Decimal, b: Decimal) -> MathResult<Decimal> {
        self.check_operand("mul", a)?;
        self.check_operand("mul", b)?;
        let product = a.checked_mul(b).ok_or_else(|| self.overflow("mul"))?;
        self.bound("mul", round(product))
    }

    pub fn safe_div(&self, a: Decimal, b: Decimal) -> MathResult<Decimal> {
        self.check_operand("div", a)?;
        self.check_operand("div", b)?;
        if b.is_zero() {
            return Err(MathError::DivisionByZero);
        }
        let quotient = a.checked_div(b).ok_or_else(|| self.overflow("div"))?;
        self.bound("div", round(quotient))
    }

    /// `amount * fraction` with `fraction` in `[0, 1]`.
    pub fn safe_fraction(&self, amount: Decimal, fraction: Decimal) -> MathResult<Decimal> {
        if fraction > Decimal::ONE {
            return Err(MathError::InvalidOperand {
                operation: "fraction",
                value: fraction,
            });
        }
        self.safe_mul(amount, fraction)
    }

    /// Sum of many amounts, failing on the first violation.
    pub fn safe_sum<I>(&self, values: I) -> MathResult<Decimal>
    where
        I: IntoIterator<Item = Decimal>,
    {
        values
            .into_iter()
            .try_fold(Decimal::ZERO, |acc, v| self.safe_add(acc, v))
    }

    /// Fail unless `value` is a legal balance.
    pub fn ensure_valid(&self, value: Decimal) -> MathResult<Decimal> {
        self.bound("check", value)
    }
}

fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(TOKEN_SCALE, RoundingStrategy::MidpointNearestEven)
}
