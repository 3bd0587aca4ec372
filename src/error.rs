//! Typed errors for the failure classes callers need to tell apart.
//!
//! Configuration errors abort before any resource is touched, coordination
//! errors leave the monitor idle. Everything else travels as `anyhow::Error`.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems, raised before the service acquires anything.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("file monitoring is disabled in configuration")]
    MonitoringDisabled,

    #[error("watch path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("watch path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("permission denied reading watch path: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("invalid configuration file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to read configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Stable snake_case name, used as the failing health check's name.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::MonitoringDisabled => "monitoring_disabled",
            ConfigError::PathNotFound(_) => "path_not_found",
            ConfigError::NotADirectory(_) => "not_a_directory",
            ConfigError::PermissionDenied(_) => "permission_denied",
            ConfigError::Parse { .. } => "config_parse",
            ConfigError::Io { .. } => "config_io",
        }
    }
}

/// Failures of the cross-process singleton lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("memwatch is already running (lock held on {})", .path.display())]
    AlreadyRunning { path: PathBuf },

    #[error("lock file error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons `Monitor::start` can refuse to run.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to start file watcher: {0}")]
    Watcher(String),

    #[error("failed to spawn processing thread: {0}")]
    Spawn(#[source] std::io::Error),
}
