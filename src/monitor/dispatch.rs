//! Dispatch of one event with retry, backoff and statistics.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::retry::{classify, FailureClass, RetryPolicy, RetryState};
use super::stats::MonitorStats;
use crate::processor::{ProcessOutcome, Processor};
use crate::signals::ShutdownToken;
use crate::watcher::ChangeEvent;

/// How a dispatched event settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub event: ChangeEvent,
    pub success: bool,
    pub attempts: u32,
    pub error: Option<String>,
    pub elapsed: Duration,
}

pub struct Dispatcher {
    processor: Arc<dyn Processor>,
    policy: RetryPolicy,
    stats: Arc<MonitorStats>,
    /// Interrupts backoff sleeps when the monitor stops.
    stop: ShutdownToken,
}

impl Dispatcher {
    pub fn new(
        processor: Arc<dyn Processor>,
        policy: RetryPolicy,
        stats: Arc<MonitorStats>,
        stop: ShutdownToken,
    ) -> Self {
        Self {
            processor,
            policy,
            stats,
            stop,
        }
    }

    /// Apply `event`, retrying transient failures up to the policy limit.
    pub fn dispatch(&self, event: &ChangeEvent) -> DispatchReport {
        let mut state = RetryState::new();
        let max_attempts = self.policy.max_attempts();

        loop {
            state.attempt += 1;
            let outcome = self.processor.apply(event);
            if outcome.was_dispatched() {
                self.stats.record_call();
            }
            if matches!(outcome, ProcessOutcome::TimedOut { .. }) {
                self.stats.record_timeout();
            }

            let class = match classify(&outcome) {
                None => {
                    log_output(event, &outcome, true);
                    info!(event = %event, attempts = state.attempt, "synced");
                    self.stats.record_success();
                    return self.report(event, &state, true);
                }
                Some(class) => class,
            };

            log_output(event, &outcome, false);
            let summary = outcome.summary();
            state.last_error = Some(summary.clone());

            if class == FailureClass::Permanent {
                error!(event = %event, attempt = state.attempt, error = %summary, "permanent failure, not retrying");
                self.stats.record_failure(&summary, true);
                return self.report(event, &state, false);
            }

            if state.attempt >= max_attempts {
                error!(event = %event, attempts = state.attempt, error = %summary, "giving up after retries");
                self.stats.record_failure(&summary, false);
                return self.report(event, &state, false);
            }

            let delay = self.policy.delay_after(state.attempt);
            warn!(
                event = %event,
                attempt = state.attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %summary,
                "transient failure, retrying"
            );
            if self.stop.wait_for_shutdown(delay) {
                let message = format!("interrupted by shutdown after {summary}");
                warn!(event = %event, "retry abandoned: monitor stopping");
                self.stats.record_failure(&message, false);
                state.last_error = Some(message);
                return self.report(event, &state, false);
            }
            self.stats.record_retry();
        }
    }

    fn report(&self, event: &ChangeEvent, state: &RetryState, success: bool) -> DispatchReport {
        DispatchReport {
            event: event.clone(),
            success,
            attempts: state.attempt,
            error: state.last_error.clone().filter(|_| !success),
            elapsed: state.elapsed(),
        }
    }
}

fn log_output(event: &ChangeEvent, outcome: &ProcessOutcome, success: bool) {
    let (stdout, stderr) = match outcome {
        ProcessOutcome::Success { stdout, stderr }
        | ProcessOutcome::Failed { stdout, stderr, .. }
        | ProcessOutcome::TimedOut { stdout, stderr, .. } => (stdout.trim(), stderr.trim()),
        ProcessOutcome::Rejected { reason } => {
            warn!(event = %event, reason = %reason, "event rejected before dispatch");
            return;
        }
    };
    if success {
        if !stdout.is_empty() {
            debug!(event = %event, "stdout: {stdout}");
        }
        if !stderr.is_empty() {
            debug!(event = %event, "stderr: {stderr}");
        }
    } else {
        if !stdout.is_empty() {
            warn!(event = %event, "stdout: {stdout}");
        }
        if !stderr.is_empty() {
            warn!(event = %event, "stderr: {stderr}");
        }
    }
}
