//! Daemon configuration
//!
//! Loaded from `<project_root>/.memwatch/config.toml` when present; every field
//! has a default so a missing file means "all defaults".

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::monitor::{MonitorConfig, RetryPolicy};
use crate::service::RestartPolicy;
use crate::watcher::PollerConfig;

/// Default state directory, relative to the project root.
pub const DEFAULT_STATE_DIR: &str = ".memwatch";

/// Configuration file name inside the state directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Master switch for file monitoring
    pub enabled: bool,
    /// Directory to watch, relative to the project root
    pub watch_path: PathBuf,
    /// Where lock, PID, status and log files live, relative to the project root
    pub state_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// File-name globs to sync; empty syncs every file
    pub include: Vec<String>,
    /// Globs for paths never synced
    pub ignore: Vec<String>,
    pub queue_capacity: usize,
    pub dedup_window_ms: u64,
    /// Sync tool plus leading arguments; `load`/`remove-file <path>` is appended
    pub command: Vec<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub command_timeout_secs: u64,
    pub join_timeout_ms: u64,
    pub memory_threshold_mb: u64,
    pub max_restart_attempts: u32,
    pub restart_error_threshold: u64,
    pub restart_min_uptime_secs: u64,
    pub restart_base_delay_ms: u64,
    pub restart_max_delay_ms: u64,
    pub restart_settle_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_path: PathBuf::from("."),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            poll_interval_ms: 1000,
            include: Vec::new(),
            ignore: [".git", DEFAULT_STATE_DIR, "target", "node_modules", "*.swp", "*.tmp", "*~"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            queue_capacity: 1000,
            dedup_window_ms: 1000,
            command: vec!["memctl".to_string()],
            max_retries: 3,
            retry_delay_ms: 1000,
            command_timeout_secs: 300,
            join_timeout_ms: 5000,
            memory_threshold_mb: 100,
            max_restart_attempts: 5,
            restart_error_threshold: 3,
            restart_min_uptime_secs: 60,
            restart_base_delay_ms: 1000,
            restart_max_delay_ms: 60_000,
            restart_settle_ms: 2000,
        }
    }
}

impl SyncConfig {
    /// Load `<root>/.memwatch/config.toml`, or defaults if it does not exist.
    pub fn discover(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(DEFAULT_STATE_DIR).join(CONFIG_FILE_NAME);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Absolute directory to watch.
    pub fn resolved_watch_path(&self, project_root: &Path) -> PathBuf {
        if self.watch_path == Path::new(".") {
            return project_root.to_path_buf();
        }
        project_root.join(&self.watch_path)
    }

    /// Check everything that must hold before the service touches any resource.
    pub fn validate(&self, project_root: &Path) -> Result<(), ConfigError> {
        if !self.enabled {
            return Err(ConfigError::MonitoringDisabled);
        }
        let watch = self.resolved_watch_path(project_root);
        let meta = match fs::metadata(&watch) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ConfigError::PermissionDenied(watch))
            }
            Err(_) => return Err(ConfigError::PathNotFound(watch)),
        };
        if !meta.is_dir() {
            return Err(ConfigError::NotADirectory(watch));
        }
        if fs::read_dir(&watch).is_err() {
            return Err(ConfigError::PermissionDenied(watch));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            max_attempts: self.max_restart_attempts,
            error_threshold: self.restart_error_threshold,
            min_uptime: Duration::from_secs(self.restart_min_uptime_secs),
            base_delay: Duration::from_millis(self.restart_base_delay_ms),
            max_delay: Duration::from_millis(self.restart_max_delay_ms),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }

    pub fn memory_threshold_bytes(&self) -> u64 {
        self.memory_threshold_mb.saturating_mul(1024 * 1024)
    }

    pub fn monitor_config(&self, paths: &ServicePaths) -> MonitorConfig {
        let mut config = MonitorConfig::new(
            self.resolved_watch_path(&paths.project_root),
            paths.lock_file.clone(),
        );
        config.poller = PollerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            include: self.include.clone(),
            ignore: self.ignore.clone(),
        };
        config.queue_capacity = self.queue_capacity;
        config.dedup_window = Duration::from_millis(self.dedup_window_ms);
        config.retry = self.retry_policy();
        config.join_timeout = Duration::from_millis(self.join_timeout_ms);
        config
    }
}

/// Files the service owns, all derived from the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub lock_file: PathBuf,
    pub pid_file: PathBuf,
    pub status_file: PathBuf,
    pub log_file: PathBuf,
}

impl ServicePaths {
    pub fn new(project_root: &Path, state_dir: &Path) -> Self {
        let state_dir = project_root.join(state_dir);
        Self {
            project_root: project_root.to_path_buf(),
            lock_file: state_dir.join("memwatch.lock"),
            pid_file: state_dir.join("memwatch.pid"),
            status_file: state_dir.join("status.json"),
            log_file: state_dir.join("memwatch.log"),
            state_dir,
        }
    }

    pub fn for_config(project_root: &Path, config: &SyncConfig) -> Self {
        Self::new(project_root, &config.state_dir)
    }
}
