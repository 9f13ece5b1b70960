//! Tuning knobs for calls made to the orchestration engine.

use std::time::Duration;

use crate::retry::backoff_delay;

/// Bounded exponential backoff: `min(base_delay * 2^attempt, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Retries after the first attempt; the call is made at most `max_retries + 1` times.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffConfig {
    /// Delay slept after failed attempt number `attempt` (starting at 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff_delay(self.base_delay, self.max_delay, attempt)
    }

    /// Every delay the wrapper may sleep, in order.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for(attempt))
    }
}
