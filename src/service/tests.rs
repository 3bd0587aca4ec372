//! Tests for the service module

use anyhow::bail;
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use super::{pidfile, CheckStatus, HealthStatus, Service, ServiceStatus, StatusSource};
use crate::config::SyncConfig;
use crate::error::ConfigError;
use crate::processor::{DirectProcessor, MemoryStore};

/// Records stored sources; optionally refuses every write.
#[derive(Default)]
struct MemoryIndex {
    sources: Mutex<Vec<PathBuf>>,
    offline: bool,
}

impl MemoryStore for MemoryIndex {
    fn store_experience(&self, source: &Path, _content: &str) -> anyhow::Result<()> {
        if self.offline {
            bail!("index offline");
        }
        self.sources.lock().unwrap().push(source.to_path_buf());
        Ok(())
    }

    fn delete_by_source(&self, source: &Path) -> anyhow::Result<usize> {
        if self.offline {
            bail!("index offline");
        }
        let mut sources = self.sources.lock().unwrap();
        let before = sources.len();
        sources.retain(|p| p != source);
        Ok(before - sources.len())
    }
}

fn test_config() -> SyncConfig {
    SyncConfig {
        poll_interval_ms: 20,
        retry_delay_ms: 10,
        restart_settle_ms: 10,
        restart_base_delay_ms: 10,
        memory_threshold_mb: 1_000_000,
        ..SyncConfig::default()
    }
}

fn service_with(root: &Path, config: SyncConfig, store: Arc<MemoryIndex>) -> Service {
    let processor = Arc::new(DirectProcessor::new(store, root));
    Service::with_processor(config, root, processor).unwrap()
}

fn service(root: &Path) -> (Service, Arc<MemoryIndex>) {
    let store = Arc::new(MemoryIndex::default());
    (service_with(root, test_config(), Arc::clone(&store)), store)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[test]
fn test_new_rejects_disabled_monitoring() {
    let temp = TempDir::new().unwrap();
    let config = SyncConfig {
        enabled: false,
        ..test_config()
    };
    let result = Service::new(config, temp.path());
    assert!(matches!(result, Err(ConfigError::MonitoringDisabled)));
}

#[test]
fn test_new_rejects_missing_watch_path() {
    let temp = TempDir::new().unwrap();
    let config = SyncConfig {
        watch_path: PathBuf::from("docs"),
        ..test_config()
    };
    let result = Service::new(config, temp.path());
    assert!(matches!(result, Err(ConfigError::PathNotFound(_))));
    assert!(!temp.path().join(".memwatch").exists());
}

#[test]
fn test_new_removes_stale_pid_file() {
    let temp = TempDir::new().unwrap();
    let pid_file = temp.path().join(".memwatch").join("memwatch.pid");
    pidfile::write(&pid_file, 999_999_999).unwrap();

    let (service, _) = service(temp.path());
    assert!(!pid_file.exists());
    assert!(!service.is_running());
}

#[test]
#[serial]
fn test_start_writes_pid_and_status() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.md"), "alpha").unwrap();
    let (mut service, _) = service(temp.path());

    assert!(service.start());
    assert!(service.is_running());
    assert_eq!(
        pidfile::read(&service.paths().pid_file),
        Some(std::process::id())
    );

    let status = ServiceStatus::read(&service.paths().status_file).unwrap();
    assert!(status.is_running);
    assert_eq!(status.pid, std::process::id());
    assert_eq!(status.files_monitored, 1);
    assert!(status.started_at.is_some());

    assert!(service.stop());
}

#[test]
#[serial]
fn test_stop_removes_pid_and_status_files() {
    let temp = TempDir::new().unwrap();
    let (mut service, _) = service(temp.path());
    assert!(service.start());

    assert!(service.stop());
    assert!(!service.paths().pid_file.exists());
    assert!(!service.paths().status_file.exists());
    assert!(!service.is_running());
    assert!(!service.status().is_running);

    // Stopping again is a no-op.
    assert!(service.stop());
}

#[test]
#[serial]
fn test_start_twice_fails() {
    let temp = TempDir::new().unwrap();
    let (mut service, _) = service(temp.path());
    assert!(service.start());
    assert!(!service.start());
    assert!(service.is_running());
    service.stop();
}

#[test]
#[serial]
fn test_second_service_on_same_root_cannot_start() {
    let temp = TempDir::new().unwrap();
    let (mut first, _) = service(temp.path());
    assert!(first.start());

    let (mut second, _) = service(temp.path());
    assert!(!second.start());
    assert_eq!(second.status().error_count, 1);
    drop(second);

    // The loser must not have touched the winner's files.
    assert!(first.paths().pid_file.exists());
    assert!(first.paths().status_file.exists());
    first.stop();
}

#[test]
#[serial]
fn test_dispatch_updates_status_file() {
    let temp = TempDir::new().unwrap();
    let (mut service, store) = service(temp.path());
    assert!(service.start());

    fs::write(temp.path().join("a.md"), "alpha").unwrap();
    let status_file = service.paths().status_file.clone();
    assert!(wait_until(Duration::from_secs(5), || {
        ServiceStatus::read(&status_file).is_ok_and(|s| s.sync_operations == 1)
    }));

    let status = ServiceStatus::read(&status_file).unwrap();
    assert!(status.last_sync_time.is_some());
    assert_eq!(status.error_count, 0);
    assert_eq!(*store.sources.lock().unwrap(), vec![PathBuf::from("a.md")]);
    service.stop();
}

#[test]
#[serial]
fn test_failed_dispatch_counts_one_error() {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryIndex {
        offline: true,
        ..MemoryIndex::default()
    });
    let mut service = service_with(temp.path(), test_config(), store);
    assert!(service.start());

    fs::write(temp.path().join("a.md"), "alpha").unwrap();
    assert!(wait_until(Duration::from_secs(5), || service.status().error_count == 1));

    let stats = service.monitor_stats().unwrap();
    assert_eq!(stats.subprocess_calls, 4);
    assert_eq!(stats.subprocess_errors, 1);
    let last_error = service.status().last_error.unwrap();
    assert!(last_error.contains("index offline"));
    service.stop();
}

#[test]
#[serial]
fn test_restart_increments_restart_count() {
    let temp = TempDir::new().unwrap();
    let (mut service, _) = service(temp.path());
    assert!(service.start());

    assert!(service.restart());
    assert_eq!(service.status().restart_count, 1);
    assert!(service.is_running());

    let status = ServiceStatus::read(&service.paths().status_file).unwrap();
    assert_eq!(status.restart_count, 1);
    service.stop();
}

#[test]
#[serial]
fn test_restart_aborts_on_shutdown() {
    let temp = TempDir::new().unwrap();
    let (mut service, _) = service(temp.path());
    assert!(service.start());

    service.shutdown_token().request_shutdown();
    assert!(!service.restart());
    assert!(!service.paths().pid_file.exists());
}

#[test]
fn test_health_unhealthy_when_not_running() {
    let temp = TempDir::new().unwrap();
    let (service, _) = service(temp.path());

    let report = service.health_check();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(
        report.check("service_running").unwrap().status,
        CheckStatus::Fail
    );
    assert_eq!(report.check("pid_file").unwrap().status, CheckStatus::Fail);
    assert_eq!(
        report.check("sync_capability").unwrap().status,
        CheckStatus::Pass
    );
}

#[test]
#[serial]
fn test_health_healthy_when_running() {
    let temp = TempDir::new().unwrap();
    let (mut service, _) = service(temp.path());
    assert!(service.start());

    let report = service.health_check();
    assert_eq!(report.status, HealthStatus::Healthy, "{report:?}");
    assert_eq!(report.checks.len(), 5);
    service.stop();
}

#[test]
#[serial]
fn test_health_warns_over_memory_threshold() {
    let temp = TempDir::new().unwrap();
    let config = SyncConfig {
        memory_threshold_mb: 0,
        ..test_config()
    };
    let mut service = service_with(temp.path(), config, Arc::default());
    assert!(service.start());

    let report = service.health_check();
    let memory = report.check("memory").unwrap();
    if memory.message.contains("unavailable") {
        assert_eq!(memory.status, CheckStatus::Pass);
    } else {
        assert_eq!(memory.status, CheckStatus::Warn);
        assert_eq!(report.status, HealthStatus::Warning);
    }
    service.stop();
}

#[test]
#[serial]
fn test_get_status_reads_status_file_while_running() {
    let temp = TempDir::new().unwrap();
    let (mut service, _) = service(temp.path());
    assert_eq!(service.get_status().source, StatusSource::PidFile);

    assert!(service.start());
    let report = service.get_status();
    assert_eq!(report.source, StatusSource::StatusFile);
    assert_eq!(report.pid, Some(std::process::id()));
    service.stop();
}

#[test]
#[serial]
fn test_should_restart_follows_policy() {
    let temp = TempDir::new().unwrap();
    let config = SyncConfig {
        restart_error_threshold: 1,
        restart_min_uptime_secs: 0,
        ..test_config()
    };
    let store = Arc::new(MemoryIndex {
        offline: true,
        ..MemoryIndex::default()
    });
    let mut service = service_with(temp.path(), config, store);
    assert!(service.start());
    assert!(!service.should_restart());

    fs::write(temp.path().join("a.md"), "alpha").unwrap();
    assert!(wait_until(Duration::from_secs(5), || service.should_restart()));
    service.stop();
}

#[test]
#[serial]
fn test_supervise_restarts_then_stops_on_shutdown() {
    let temp = TempDir::new().unwrap();
    let config = SyncConfig {
        restart_error_threshold: 1,
        restart_min_uptime_secs: 0,
        max_restart_attempts: 1,
        ..test_config()
    };
    let store = Arc::new(MemoryIndex {
        offline: true,
        ..MemoryIndex::default()
    });
    let mut service = service_with(temp.path(), config, store);
    assert!(service.start());

    fs::write(temp.path().join("a.md"), "alpha").unwrap();
    assert!(wait_until(Duration::from_secs(5), || service.status().error_count == 1));

    let token = service.shutdown_token();
    let tripper = thread::spawn(move || {
        thread::sleep(Duration::from_secs(3));
        token.request_shutdown();
    });
    service.supervise();
    tripper.join().unwrap();

    assert_eq!(service.status().restart_count, 1);
    assert!(!service.paths().pid_file.exists());
    assert!(!service.paths().status_file.exists());
}
