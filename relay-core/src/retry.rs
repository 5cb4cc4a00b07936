//! Retry policy for socket establishment.
//!
//! A [`RetryPolicy`] is a plain value: how many attempts, and how long to wait
//! between them. The async helper that consumes it lives in relay-client.
//!
//! Delays double from `base_delay` and are capped at `max_delay`:
//!
//! | failed attempt | delay (base 1s, cap 8s) |
//! |----------------|-------------------------|
//! | 1              | 1s                      |
//! | 2              | 2s                      |
//! | 3              | 4s                      |
//! | 4              | 8s                      |
//! | 5 and later    | 8s                      |

use std::time::Duration;

/// Default number of connection attempts per relay.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first failed attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default ceiling on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Attempts actually allowed (at least one).
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt follows failed attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    /// Worst-case wall clock for one target: every attempt times out after
    /// `per_attempt`, plus all backoff delays in between.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let attempts = self.attempts();
        let waits: Duration = (1..attempts).map(|a| self.delay_for(a)).sum();
        per_attempt * attempts + waits
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}
