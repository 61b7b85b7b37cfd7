//! Backoff policy for failed stage attempts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff with a cap and additive jitter.
///
/// `delay(attempt)` is `min(base * 2^attempt, max)` widened by up to +10%
/// uniform jitter so many pipelines failing at once do not retry in
/// lockstep. Pure computation; no failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Base delay in milliseconds for attempt 0.
    pub base_delay_ms: u64,
    /// Cap applied before jitter, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default 1s base and 30s cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Computes the backoff delay for a zero-indexed failed attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        let jitter = if exp == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=exp / 10)
        };
        Duration::from_millis(exp.saturating_add(jitter))
    }
}
