//! Change processors: how a single event reaches the memory store.
//!
//! The monitor owns retry, backoff and statistics; a [`Processor`] performs
//! exactly one attempt and reports what happened.

mod command;
mod direct;

pub use command::{CommandProcessor, DEFAULT_COMMAND_TIMEOUT};
pub use direct::{DirectProcessor, MemoryStore};

use std::time::Duration;

use crate::watcher::ChangeEvent;

/// Result of one processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Success {
        stdout: String,
        stderr: String,
    },
    /// The attempt ran and failed. `exit_code` is `None` for in-process failures.
    Failed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
    /// Refused before dispatch; never retried.
    Rejected {
        reason: String,
    },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success { .. })
    }

    /// Whether the external target was actually invoked.
    pub fn was_dispatched(&self) -> bool {
        !matches!(self, ProcessOutcome::Rejected { .. })
    }

    /// One-line description for logs and `last_error`.
    pub fn summary(&self) -> String {
        match self {
            ProcessOutcome::Success { .. } => "success".to_string(),
            ProcessOutcome::Failed {
                exit_code: Some(code),
                stderr,
                ..
            } => format!("exit code {code}: {}", first_line(stderr)),
            ProcessOutcome::Failed {
                exit_code: None,
                stderr,
                ..
            } => first_line(stderr).to_string(),
            ProcessOutcome::TimedOut { timeout, .. } => {
                format!("timed out after {}s", timeout.as_secs_f64())
            }
            ProcessOutcome::Rejected { reason } => format!("rejected: {reason}"),
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no error output")
}

/// Applies a single change event to the sync target.
pub trait Processor: Send + Sync {
    /// Short name used in logs and health output.
    fn name(&self) -> &str;

    /// Perform one attempt. Must not retry internally.
    fn apply(&self, event: &ChangeEvent) -> ProcessOutcome;

    /// Whether the sync target can be reached at all.
    fn check_available(&self) -> Result<(), String> {
        Ok(())
    }
}
