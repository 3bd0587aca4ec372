use std::path::PathBuf;
use std::time::Duration;

use super::retry::RetryPolicy;
use crate::watcher::{PollerConfig, DEFAULT_DEDUP_WINDOW, DEFAULT_QUEUE_CAPACITY};

/// Configuration for the monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory (or file) to watch
    pub watch_path: PathBuf,
    /// Singleton lock file
    pub lock_path: PathBuf,
    pub poller: PollerConfig,
    pub queue_capacity: usize,
    pub dedup_window: Duration,
    pub retry: RetryPolicy,
    /// How long the processing thread blocks in each queue read
    pub queue_timeout: Duration,
    /// Upper bound on waiting for the processing thread in `stop`
    pub join_timeout: Duration,
}

impl MonitorConfig {
    pub fn new(watch_path: PathBuf, lock_path: PathBuf) -> Self {
        Self {
            watch_path,
            lock_path,
            poller: PollerConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            retry: RetryPolicy::default(),
            queue_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
        }
    }
}
