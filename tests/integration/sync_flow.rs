//! File changes flowing through the daemon into the sync tool

use serial_test::serial;
use std::fs;
use std::thread;
use std::time::Duration;

use memwatch::service::{Service, ServiceStatus};

use super::helpers::*;

const WAIT: Duration = Duration::from_secs(10);

#[test]
#[serial]
fn test_added_file_is_loaded() {
    let fx = Fixture::new();
    let tool = fx.fake_tool(0, "");
    let mut service = Service::new(fx.config(&tool), fx.root()).unwrap();
    assert!(service.start());

    fx.write("a.md", "# alpha");
    assert!(wait_until(WAIT, || {
        service.monitor_stats().is_some_and(|s| s.files_processed == 1)
    }));

    let stats = service.monitor_stats().unwrap();
    assert_eq!(stats.subprocess_calls, 1);
    assert_eq!(stats.subprocess_errors, 0);
    assert_eq!(fx.calls(), vec!["load a.md"]);

    let status = ServiceStatus::read(&service.paths().status_file).unwrap();
    assert_eq!(status.sync_operations, 1);
    service.stop();
}

#[test]
#[serial]
fn test_rapid_modifications_dispatch_once() {
    let fx = Fixture::new();
    fx.write("a.md", "v1");
    let tool = fx.fake_tool(0, "");
    let mut service = Service::new(fx.config(&tool), fx.root()).unwrap();
    assert!(service.start());

    fx.write("a.md", "version two");
    thread::sleep(Duration::from_millis(200));
    fx.write("a.md", "version three, longer");

    assert!(wait_until(WAIT, || !fx.calls().is_empty()));
    // Outlast the dedup window, then make sure nothing else arrived.
    thread::sleep(Duration::from_millis(1200));
    assert_eq!(fx.calls(), vec!["load a.md"]);
    assert_eq!(service.monitor_stats().unwrap().subprocess_calls, 1);
    service.stop();
}

#[test]
#[serial]
fn test_delete_with_missing_tool_is_not_retried() {
    let fx = Fixture::new();
    fx.write("a.md", "alpha");
    let tool = fx.fake_tool(127, "memctl: command not found");
    let mut service = Service::new(fx.config(&tool), fx.root()).unwrap();
    assert!(service.start());

    fs::remove_file(fx.root().join("a.md")).unwrap();
    assert!(wait_until(WAIT, || {
        service.monitor_stats().is_some_and(|s| s.subprocess_errors == 1)
    }));

    let stats = service.monitor_stats().unwrap();
    assert_eq!(stats.subprocess_retries, 0);
    assert_eq!(stats.subprocess_calls, 1);
    assert_eq!(stats.permanent_failures, 1);
    assert_eq!(fx.calls(), vec!["remove-file a.md"]);
    service.stop();
}

#[test]
#[serial]
fn test_transient_failure_retried_to_limit() {
    let fx = Fixture::new();
    let tool = fx.fake_tool(1, "index busy");
    let mut service = Service::new(fx.config(&tool), fx.root()).unwrap();
    assert!(service.start());

    fx.write("a.md", "alpha");
    assert!(wait_until(WAIT, || {
        service.monitor_stats().is_some_and(|s| s.subprocess_errors == 1)
    }));

    let stats = service.monitor_stats().unwrap();
    assert_eq!(stats.subprocess_calls, 4);
    assert_eq!(stats.subprocess_retries, 3);
    assert_eq!(fx.calls().len(), 4);
    assert!(stats.last_error.unwrap().contains("index busy"));
    assert_eq!(service.status().error_count, 1);
    service.stop();
}

#[test]
#[serial]
fn test_ignored_and_excluded_files_are_not_synced() {
    let fx = Fixture::new();
    let tool = fx.fake_tool(0, "");
    let mut config = fx.config(&tool);
    config.include = vec!["*.md".to_string()];
    let mut service = Service::new(config, fx.root()).unwrap();
    assert!(service.start());

    fx.write("notes.txt", "skip me");
    fx.write("draft.md.swp", "skip me too");
    fx.write("b.md", "keep");

    assert!(wait_until(WAIT, || !fx.calls().is_empty()));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(fx.calls(), vec!["load b.md"]);
    service.stop();
}
