//! Per-event retry policy and failure classification
//!
//! Retries use linear backoff (`retry_delay * attempt`). Service-level
//! restarts back off exponentially instead; see `service::restart`.

use std::time::{Duration, Instant};

use crate::processor::ProcessOutcome;

/// Default number of additional attempts after the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Exit codes the shell uses for "cannot execute" and "not found".
pub const PERMANENT_EXIT_CODES: [i32; 2] = [126, 127];

/// Error text that no amount of retrying will fix. Matched case-insensitively.
pub const PERMANENT_ERROR_MARKERS: [&str; 5] = [
    "command not found",
    "permission denied",
    "no such file or directory",
    "invalid argument",
    "file not found",
];

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Permanent,
    Transient,
}

/// Classify an outcome; `None` means it succeeded.
pub fn classify(outcome: &ProcessOutcome) -> Option<FailureClass> {
    match outcome {
        ProcessOutcome::Success { .. } => None,
        ProcessOutcome::Rejected { .. } => Some(FailureClass::Permanent),
        ProcessOutcome::TimedOut { .. } => Some(FailureClass::Transient),
        ProcessOutcome::Failed {
            exit_code, stderr, ..
        } => {
            if exit_code.is_some_and(|c| PERMANENT_EXIT_CODES.contains(&c))
                || has_permanent_marker(stderr)
            {
                Some(FailureClass::Permanent)
            } else {
                Some(FailureClass::Transient)
            }
        }
    }
}

fn has_permanent_marker(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    PERMANENT_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

/// Bounded retries with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Sleep before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}

/// Progress of one event through its attempts. Dropped once the event settles.
#[derive(Debug)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<String>,
    started: Instant,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            last_error: None,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}
