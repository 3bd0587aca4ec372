//! Service lifecycle: PID/status files, health, singleton enforcement

use serial_test::serial;

use memwatch::error::LockError;
use memwatch::lock::SingletonLock;
use memwatch::service::{CheckStatus, HealthStatus, Service, StatusSource};

use super::helpers::*;

#[test]
#[serial]
fn test_stop_removes_pid_and_status_files() {
    let fx = Fixture::new();
    let tool = fx.fake_tool(0, "");
    let mut service = Service::new(fx.config(&tool), fx.root()).unwrap();

    assert!(service.start());
    let pid_file = service.paths().pid_file.clone();
    let status_file = service.paths().status_file.clone();
    assert!(pid_file.exists());
    assert!(status_file.exists());

    assert!(service.stop());
    assert!(!pid_file.exists());
    assert!(!status_file.exists());
    assert!(!service.is_running());
}

#[test]
#[serial]
fn test_health_tracks_running_state() {
    let fx = Fixture::new();
    let tool = fx.fake_tool(0, "");
    let mut service = Service::new(fx.config(&tool), fx.root()).unwrap();

    let report = service.health_check();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(
        report.check("service_running").unwrap().status,
        CheckStatus::Fail
    );

    assert!(service.start());
    let report = service.health_check();
    assert_eq!(report.status, HealthStatus::Healthy, "{report:?}");
    service.stop();
}

#[test]
#[serial]
fn test_health_fails_when_tool_is_missing() {
    let fx = Fixture::new();
    let mut config = fx.config(&fx.fake_tool(0, ""));
    config.command = vec!["memwatch-test-tool-that-does-not-exist".to_string()];
    let mut service = Service::new(config, fx.root()).unwrap();
    assert!(service.start());

    let report = service.health_check();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(
        report.check("sync_capability").unwrap().status,
        CheckStatus::Fail
    );
    service.stop();
}

#[test]
#[serial]
fn test_second_instance_is_refused() {
    let fx = Fixture::new();
    let tool = fx.fake_tool(0, "");
    let mut first = Service::new(fx.config(&tool), fx.root()).unwrap();
    let mut second = Service::new(fx.config(&tool), fx.root()).unwrap();

    assert!(first.start());
    assert!(!second.start());
    assert!(first.is_running());

    first.stop();
    assert!(second.start());
    second.stop();
}

#[test]
fn test_lock_contention_and_handover() {
    let fx = Fixture::new();
    let path = fx.root().join(".memwatch").join("memwatch.lock");

    let mut held = SingletonLock::acquire(&path).unwrap();
    let err = SingletonLock::acquire(&path).unwrap_err();
    assert!(matches!(err, LockError::AlreadyRunning { .. }));

    held.release();
    assert!(SingletonLock::acquire(&path).is_ok());
}

#[test]
#[serial]
fn test_status_report_while_running_and_after_stop() {
    let fx = Fixture::new();
    fx.write("a.md", "alpha");
    fx.write("b.md", "beta");
    let tool = fx.fake_tool(0, "");
    let mut service = Service::new(fx.config(&tool), fx.root()).unwrap();

    assert!(service.start());
    let report = service.get_status();
    assert_eq!(report.source, StatusSource::StatusFile);
    assert_eq!(report.status.unwrap().files_monitored, 2);

    service.stop();
    let report = service.get_status();
    assert_eq!(report.source, StatusSource::PidFile);
    assert!(!report.is_running);
}
