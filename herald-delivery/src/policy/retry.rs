//! Retry policy for delivery operations.
//!
//! The policy is read once at startup and never changes during a run. It
//! answers two questions for the engine: may this attempt be retried, and
//! how long to wait first.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ErrorClass, PolicyError};

/// Retry policy configuration for delivery operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt fails.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds.
    ///
    /// The wait after attempt `n` is `base * 2^(n - 1)`. There is no upper
    /// cap and no jitter.
    ///
    /// Default: 500
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy, rejecting a zero base delay.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ZeroBaseDelay`] when `base_delay_ms` is zero.
    pub const fn new(max_retries: u32, base_delay_ms: u64) -> Result<Self, PolicyError> {
        let policy = Self {
            max_retries,
            base_delay_ms,
        };
        match policy.check() {
            Ok(()) => Ok(policy),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    ///
    /// Returns [`PolicyError::ZeroBaseDelay`] when `base_delay_ms` is zero.
    pub const fn check(&self) -> Result<(), PolicyError> {
        if self.base_delay_ms == 0 {
            Err(PolicyError::ZeroBaseDelay)
        } else {
            Ok(())
        }
    }

    /// Whether attempt number `attempt` (1-based), which failed with an error
    /// of class `class`, should be followed by another attempt.
    #[must_use]
    pub const fn should_retry(&self, class: ErrorClass, attempt: u32) -> bool {
        class.is_transient() && attempt <= self.max_retries
    }

    /// The most attempts a run can make.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// How long to wait after attempt `attempt` (1-based) before the next.
    ///
    /// `base * 2^(attempt - 1)`, saturating at `u64::MAX` milliseconds.
    #[must_use]
    pub const fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = if exponent >= u64::BITS {
            u64::MAX
        } else {
            self.base_delay_ms.saturating_mul(1u64 << exponent)
        };

        Duration::from_millis(delay)
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        500
    }
}
