//! Fixed-delay reconnection with a bounded attempt budget.
//!
//! The live channel retries after [`ReconnectConfig::delay`] and gives up
//! once [`ReconnectConfig::max_attempts`] consecutive attempts have failed.
//! An open that delivers at least one update resets the count.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for the reconnect strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before each reconnection attempt.
    pub delay: Duration,
    /// Consecutive failed attempts before the channel is abandoned.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

/// Consecutive-failure counter owned by one subscription.
#[derive(Debug)]
pub struct ReconnectBudget {
    config: ReconnectConfig,
    failures: u32,
}

impl ReconnectBudget {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Count a failed attempt and return the running total.
    pub fn record_failure(&mut self) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.failures
    }

    /// Forget earlier failures after a successful open.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures >= self.config.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.config.delay
    }
}

/// Sleep for `delay` unless `cancel` fires first.
///
/// Returns `false` when cancelled.
pub async fn backoff(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
