//! Retry delays.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed { delay_ms: u64 },
    /// `base * 2^(attempt-1)`, capped.
    Exponential { base_ms: u64, max_ms: u64 },
    /// Uniform in `[0, exponential]` ("full jitter"), capped.
    ExponentialWithJitter { base_ms: u64, max_ms: u64 },
}

impl BackoffStrategy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential { base_ms, max_ms } => {
                Duration::from_millis(exponential_ms(base_ms, max_ms, attempt))
            }
            Self::ExponentialWithJitter { base_ms, max_ms } => {
                let ceiling = exponential_ms(base_ms, max_ms, attempt);
                if ceiling == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
            }
        }
    }
}

fn exponential_ms(base_ms: u64, max_ms: u64, attempt: u32) -> u64 {
    let shift = attempt.saturating_sub(1).min(32);
    base_ms.saturating_mul(1u64 << shift).min(max_ms)
}

/// Bounded retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::ExponentialWithJitter {
                base_ms: 25,
                max_ms: 1_000,
            },
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffStrategy::Fixed { delay_ms: 0 },
        }
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_doubles_then_caps() {
        let b = BackoffStrategy::Exponential {
            base_ms: 10,
            max_ms: 50,
        };
        assert_eq!(b.delay_for(1), Duration::from_millis(10));
        assert_eq!(b.delay_for(2), Duration::from_millis(20));
        assert_eq!(b.delay_for(3), Duration::from_millis(40));
        assert_eq!(b.delay_for(4), Duration::from_millis(50));
        assert_eq!(b.delay_for(60), Duration::from_millis(50));
    }

    #[test]
    fn test_jitter_stays_under_ceiling() {
        let b = BackoffStrategy::ExponentialWithJitter {
            base_ms: 10,
            max_ms: 100,
        };
        for attempt in 1..10 {
            assert!(b.delay_for(attempt) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_retry_bound() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }
}
