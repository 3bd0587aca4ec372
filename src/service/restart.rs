//! Service-level self-restart policy.
//!
//! Separate from per-event retry: this decides whether the whole monitor
//! should be torn down and started again, and how long to wait first.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_attempts: u32,
    /// Cumulative error count at which a restart is considered
    pub error_threshold: u64,
    /// Minimum time since the last start, to avoid restart storms
    pub min_uptime: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            error_threshold: 3,
            min_uptime: Duration::from_secs(60),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    pub fn should_restart(&self, error_count: u64, attempts: u32, uptime: Duration) -> bool {
        error_count >= self.error_threshold
            && attempts < self.max_attempts
            && uptime >= self.min_uptime
    }

    /// `min(base * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}
