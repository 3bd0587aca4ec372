//! Processing statistics, updated lock-free from the processing thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Live counters shared between the processing thread and readers.
#[derive(Debug, Default)]
pub struct MonitorStats {
    events_received: AtomicU64,
    files_processed: AtomicU64,
    subprocess_calls: AtomicU64,
    subprocess_errors: AtomicU64,
    subprocess_retries: AtomicU64,
    subprocess_timeouts: AtomicU64,
    permanent_failures: AtomicU64,
    last_activity: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time copy of [`MonitorStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub events_received: u64,
    pub files_processed: u64,
    pub subprocess_calls: u64,
    pub subprocess_errors: u64,
    pub subprocess_retries: u64,
    pub subprocess_timeouts: u64,
    pub permanent_failures: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl MonitorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn record_call(&self) {
        self.subprocess_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.subprocess_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.subprocess_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Once per failed event, never per attempt.
    pub(crate) fn record_failure(&self, error: &str, permanent: bool) {
        self.subprocess_errors.fetch_add(1, Ordering::Relaxed);
        if permanent {
            self.permanent_failures.fetch_add(1, Ordering::Relaxed);
        }
        *self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(error.to_string());
        self.touch();
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            subprocess_calls: self.subprocess_calls.load(Ordering::Relaxed),
            subprocess_errors: self.subprocess_errors.load(Ordering::Relaxed),
            subprocess_retries: self.subprocess_retries.load(Ordering::Relaxed),
            subprocess_timeouts: self.subprocess_timeouts.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            last_activity: *self
                .last_activity
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }
}
