//! The service: configuration, PID and status files, health, restarts.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::health::{HealthCheck, HealthReport};
use super::pidfile;
use super::restart::RestartPolicy;
use super::status::{ServiceStatus, StatusReport};
use crate::config::{ServicePaths, SyncConfig};
use crate::error::ConfigError;
use crate::fs::atomic::remove_if_exists;
use crate::monitor::{DispatchObserver, DispatchReport, Monitor, StatsSnapshot};
use crate::process::resident_memory_bytes;
use crate::processor::{CommandProcessor, Processor};
use crate::signals::{ShutdownToken, SignalHandler};

/// How often the supervisor refreshes status and consults the restart policy.
const SUPERVISOR_TICK: Duration = Duration::from_secs(1);

pub struct Service {
    config: SyncConfig,
    paths: ServicePaths,
    processor: Arc<dyn Processor>,
    restart_policy: RestartPolicy,
    shutdown: ShutdownToken,
    status: Arc<Mutex<ServiceStatus>>,
    monitor: Option<Monitor>,
}

impl Service {
    /// Validate `config` and build a service that syncs through the configured command.
    pub fn new(config: SyncConfig, project_root: &Path) -> Result<Self, ConfigError> {
        let processor = Arc::new(CommandProcessor::new(
            config.command.clone(),
            project_root,
            config.command_timeout(),
        ));
        Self::with_processor(config, project_root, processor)
    }

    pub fn with_processor(
        config: SyncConfig,
        project_root: &Path,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, ConfigError> {
        config.validate(project_root)?;

        let paths = ServicePaths::for_config(project_root, &config);
        pidfile::cleanup_stale(&paths.pid_file);

        Ok(Self {
            restart_policy: config.restart_policy(),
            config,
            paths,
            processor,
            shutdown: ShutdownToken::new(),
            status: Arc::new(Mutex::new(ServiceStatus::new(std::process::id()))),
            monitor: None,
        })
    }

    /// Start monitoring. Returns false, holding nothing, if anything fails.
    pub fn start(&mut self) -> bool {
        if self.monitor.as_ref().is_some_and(Monitor::is_running) {
            warn!("service is already running");
            return false;
        }
        let own_pid = std::process::id();
        if let Some(pid) = pidfile::running_pid(&self.paths.pid_file) {
            if pid != own_pid {
                error!(pid, "another memwatch instance is running");
                return false;
            }
        }

        // Held for the service's lifetime so restarts never drop signals.
        if let Err(e) = SignalHandler::register_handlers(&self.shutdown) {
            warn!(error = %e, "continuing without signal handlers");
        }

        let mut monitor = Monitor::new(
            self.config.monitor_config(&self.paths),
            Arc::clone(&self.processor),
            self.shutdown.clone(),
        );
        monitor.set_observer(self.status_observer());

        if let Err(e) = monitor.start() {
            error!(error = %e, "failed to start monitor");
            lock_status(&self.status).record_error(e.to_string());
            return false;
        }

        if let Err(e) = pidfile::write(&self.paths.pid_file, own_pid) {
            error!(error = %format!("{e:#}"), "failed to write PID file");
            monitor.stop();
            lock_status(&self.status).record_error(format!("{e:#}"));
            return false;
        }

        let files = monitor.monitored_files();
        self.monitor = Some(monitor);
        {
            let mut status = lock_status(&self.status);
            status.pid = own_pid;
            status.mark_started(files);
            write_status(&status, &self.paths.status_file);
        }
        info!(pid = own_pid, files, root = %self.paths.project_root.display(), "service started");
        true
    }

    /// Stop monitoring and remove the PID and status files.
    pub fn stop(&mut self) -> bool {
        let Some(mut monitor) = self.monitor.take() else {
            debug!("stop requested but service is not running");
            return true;
        };

        // Cleared first so the processing thread stops rewriting the status file.
        lock_status(&self.status).is_running = false;
        monitor.stop();

        let mut ok = true;
        for path in [&self.paths.pid_file, &self.paths.status_file] {
            if let Err(e) = remove_if_exists(path) {
                error!(path = %path.display(), error = %e, "failed to remove file");
                lock_status(&self.status).record_error(e.to_string());
                ok = false;
            }
        }
        info!("service stopped");
        ok
    }

    /// Stop, settle, start again.
    pub fn restart(&mut self) -> bool {
        info!("restarting service");
        if !self.stop() {
            warn!("stop reported errors, continuing with restart");
        }
        if self.shutdown.wait_for_shutdown(self.config.restart_settle()) {
            info!("shutdown requested during restart");
            return false;
        }
        lock_status(&self.status).restart_count += 1;
        self.start()
    }

    /// A live process holds the pid in the PID file.
    pub fn is_running(&self) -> bool {
        pidfile::running_pid(&self.paths.pid_file).is_some()
    }

    pub fn get_status(&self) -> StatusReport {
        StatusReport::query(&self.paths)
    }

    pub fn health_check(&self) -> HealthReport {
        let report = self.get_status();
        HealthReport::from_checks(vec![
            self.check_running(&report),
            self.check_pid_file(),
            self.check_sync_capability(),
            self.check_file_watching(&report),
            self.check_memory(&report),
        ])
    }

    fn check_running(&self, report: &StatusReport) -> HealthCheck {
        match report.pid {
            Some(pid) if report.is_running => {
                HealthCheck::pass("service_running", format!("running (pid {pid})"))
            }
            _ => HealthCheck::fail("service_running", "service is not running"),
        }
    }

    fn check_pid_file(&self) -> HealthCheck {
        match pidfile::read(&self.paths.pid_file) {
            Some(pid) => HealthCheck::pass("pid_file", format!("PID file present (pid {pid})")),
            None if self.paths.pid_file.exists() => {
                HealthCheck::fail("pid_file", "PID file is unreadable")
            }
            None => HealthCheck::fail("pid_file", "PID file missing"),
        }
    }

    fn check_sync_capability(&self) -> HealthCheck {
        match self.processor.check_available() {
            Ok(()) => HealthCheck::pass(
                "sync_capability",
                format!("{} processor available", self.processor.name()),
            ),
            Err(message) => HealthCheck::fail("sync_capability", message),
        }
    }

    fn check_file_watching(&self, report: &StatusReport) -> HealthCheck {
        if let Some(monitor) = &self.monitor {
            return if monitor.is_watching() {
                HealthCheck::pass(
                    "file_watching",
                    format!("watching {} files", monitor.monitored_files()),
                )
            } else {
                HealthCheck::fail("file_watching", "file watcher is not running")
            };
        }
        match &report.status {
            Some(status) if status.is_running => HealthCheck::pass(
                "file_watching",
                format!("watching {} files (pid {})", status.files_monitored, status.pid),
            ),
            _ => HealthCheck::fail("file_watching", "file watcher is not running"),
        }
    }

    fn check_memory(&self, report: &StatusReport) -> HealthCheck {
        let pid = report.pid.unwrap_or_else(std::process::id);
        let Some(bytes) = resident_memory_bytes(pid) else {
            return HealthCheck::pass("memory", "memory usage unavailable on this platform");
        };
        let mb = bytes / (1024 * 1024);
        if bytes > self.config.memory_threshold_bytes() {
            HealthCheck::warn(
                "memory",
                format!(
                    "using {mb} MB (threshold {} MB)",
                    self.config.memory_threshold_mb
                ),
            )
        } else {
            HealthCheck::pass("memory", format!("using {mb} MB"))
        }
    }

    /// Whether the supervisor should tear the monitor down and start again.
    pub fn should_restart(&self) -> bool {
        let status = lock_status(&self.status);
        let uptime = status.uptime().unwrap_or(Duration::ZERO);
        self.restart_policy
            .should_restart(status.error_count, status.restart_count, uptime)
    }

    /// Run until the shutdown token trips, restarting under the restart policy.
    /// Stops the service before returning.
    pub fn supervise(&mut self) {
        info!("supervisor running");
        while !self.shutdown.wait_for_shutdown(SUPERVISOR_TICK) {
            self.refresh_status();

            if self.should_restart() {
                let attempt = lock_status(&self.status).restart_count;
                let delay = self.restart_policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "error threshold reached, restarting service"
                );
                if self.shutdown.wait_for_shutdown(delay) {
                    break;
                }
                if !self.restart() {
                    error!("restart failed");
                }
            } else if self.monitor.is_none() {
                error!("monitor is not running and no restart is allowed, giving up");
                break;
            }
        }
        info!("supervisor exiting, stopping service");
        self.stop();
    }

    fn refresh_status(&self) {
        let Some(monitor) = &self.monitor else {
            return;
        };
        let files = monitor.monitored_files();
        let mut status = lock_status(&self.status);
        if status.is_running && status.files_monitored != files {
            status.files_monitored = files;
            write_status(&status, &self.paths.status_file);
        }
    }

    fn status_observer(&self) -> DispatchObserver {
        let status = Arc::clone(&self.status);
        let path = self.paths.status_file.clone();
        Arc::new(move |report: &DispatchReport| {
            let mut status = lock_status(&status);
            status.record_dispatch(report);
            if status.is_running {
                write_status(&status, &path);
            }
        })
    }

    /// In-process copy of the status record.
    pub fn status(&self) -> ServiceStatus {
        lock_status(&self.status).clone()
    }

    pub fn monitor_stats(&self) -> Option<StatsSnapshot> {
        self.monitor.as_ref().map(Monitor::stats)
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    pub fn paths(&self) -> &ServicePaths {
        &self.paths
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
        SignalHandler::unregister(&self.shutdown);
    }
}

fn lock_status(status: &Mutex<ServiceStatus>) -> MutexGuard<'_, ServiceStatus> {
    status
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Status writes are advisory; failures are logged, never fatal.
fn write_status(status: &ServiceStatus, path: &Path) {
    if let Err(e) = status.write(path) {
        warn!(path = %path.display(), error = %format!("{e:#}"), "failed to write status file");
    }
}
