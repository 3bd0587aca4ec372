//! Status file shared with out-of-process readers (`memwatch status`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::pidfile;
use crate::config::ServicePaths;
use crate::fs::atomic::atomic_write;
use crate::monitor::DispatchReport;

/// Bumped whenever a field changes meaning or is removed.
pub const STATUS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub version: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub pid: u32,
    pub is_running: bool,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub restart_count: u32,
    pub files_monitored: usize,
    /// Events synced successfully
    pub sync_operations: u64,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl ServiceStatus {
    pub fn new(pid: u32) -> Self {
        Self {
            version: STATUS_VERSION,
            started_at: None,
            pid,
            is_running: false,
            error_count: 0,
            last_error: None,
            restart_count: 0,
            files_monitored: 0,
            sync_operations: 0,
            last_sync_time: None,
        }
    }

    pub fn mark_started(&mut self, files_monitored: usize) {
        self.started_at = Some(Utc::now());
        self.is_running = true;
        self.files_monitored = files_monitored;
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.error_count += 1;
        self.last_error = Some(error.into());
    }

    pub fn record_dispatch(&mut self, report: &DispatchReport) {
        if report.success {
            self.sync_operations += 1;
            self.last_sync_time = Some(Utc::now());
        } else {
            let error = report
                .error
                .clone()
                .unwrap_or_else(|| "dispatch failed".to_string());
            self.record_error(format!("{}: {error}", report.event.path().display()));
        }
    }

    /// Time since the last successful start.
    pub fn uptime(&self) -> Option<Duration> {
        let started = self.started_at?;
        (Utc::now() - started).to_std().ok()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize status")?;
        atomic_write(path, &json)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read status file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse status file: {}", path.display()))
    }
}

/// Where a status answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// Daemon alive and its status file parsed
    StatusFile,
    /// No live daemon; derived from the PID file alone
    PidFile,
    /// Daemon alive but its status file is missing or unreadable
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub source: StatusSource,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub status: Option<ServiceStatus>,
}

impl StatusReport {
    /// Build a report for the daemon owning `paths`, from any process.
    pub fn query(paths: &ServicePaths) -> Self {
        let Some(pid) = pidfile::running_pid(&paths.pid_file) else {
            return Self {
                source: StatusSource::PidFile,
                is_running: false,
                pid: None,
                status: None,
            };
        };

        match ServiceStatus::read(&paths.status_file) {
            Ok(status) => Self {
                source: StatusSource::StatusFile,
                is_running: true,
                pid: Some(pid),
                status: Some(status),
            },
            Err(e) => {
                tracing::debug!(error = %format!("{e:#}"), "status file unavailable");
                Self {
                    source: StatusSource::Unknown,
                    is_running: true,
                    pid: Some(pid),
                    status: None,
                }
            }
        }
    }
}
