//! # Retry Logic and Backoff Strategies
//!
//! Two retry loops use this module:
//!
//! - the per-asset loop inside a pass (`retry_delay_ms` base, capped by
//!   `max_asset_backoff`)
//! - the scheduler's auto-retry of whole passes (`auto_retry_base`, capped by
//!   `auto_retry_max_delay`, bounded by `max_auto_retries`)
//!
//! Delays are deterministic: `base * 2^attempt`, capped. No jitter is applied;
//! a single client never competes with itself.

use std::time::Duration;

/// Exponential backoff with a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStrategy {
    base: Duration,
    max: Duration,
}

impl BackoffStrategy {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }
}

/// Bounded counter of consecutive automatic pass retries
#[derive(Debug, Clone)]
pub struct AutoRetryState {
    strategy: BackoffStrategy,
    max_attempts: u32,
    attempt: u32,
}

impl AutoRetryState {
    pub fn new(strategy: BackoffStrategy, max_attempts: u32) -> Self {
        Self {
            strategy,
            max_attempts,
            attempt: 0,
        }
    }

    /// Claim the next retry slot
    ///
    /// Returns the delay to wait, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.strategy.delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Start over after a clean pass or an explicit retry
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
