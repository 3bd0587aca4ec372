//! The memwatch binary: run in the foreground, stop it from another process

use serial_test::serial;
use std::fs;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use super::helpers::*;

fn memwatch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_memwatch"))
}

#[test]
#[serial]
fn test_health_exit_code_when_not_running() {
    let fx = Fixture::new();
    let output = memwatch()
        .args(["health", "--json", "--root"])
        .arg(fx.root())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "unhealthy");
}

#[test]
#[serial]
fn test_health_reports_invalid_config() {
    let fx = Fixture::new();
    let state = fx.root().join(".memwatch");
    fs::create_dir_all(&state).unwrap();
    fs::write(state.join("config.toml"), "enabled = false\n").unwrap();

    let output = memwatch()
        .args(["health", "--json", "--root"])
        .arg(fx.root())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "unhealthy");
    assert_eq!(report["checks"][0]["name"], "monitoring_disabled");
    assert_eq!(report["checks"][0]["status"], "fail");
}

#[test]
#[serial]
fn test_status_when_not_running() {
    let fx = Fixture::new();
    let output = memwatch()
        .args(["status", "--json", "--root"])
        .arg(fx.root())
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["is_running"], false);
    assert_eq!(report["source"], "pid_file");
}

#[test]
#[serial]
fn test_run_then_stop_from_another_process() {
    let fx = Fixture::new();
    let tool = fx.fake_tool(0, "");
    let state = fx.root().join(".memwatch");
    fs::create_dir_all(&state).unwrap();
    fs::write(
        state.join("config.toml"),
        format!(
            "poll_interval_ms = 50\ncommand = [\"sh\", \"{}\"]\n",
            tool.display()
        ),
    )
    .unwrap();

    let mut daemon = memwatch()
        .args(["run", "--root"])
        .arg(fx.root())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let daemon_pid = daemon.id();
    // Reap promptly so `stop` does not see a zombie as still alive.
    let reaper = thread::spawn(move || daemon.wait());

    let pid_file = state.join("memwatch.pid");
    assert!(wait_until(Duration::from_secs(10), || pid_file.exists()));

    fx.write("a.md", "alpha");
    assert!(wait_until(Duration::from_secs(10), || fx.calls() == vec!["load a.md"]));

    let status = memwatch()
        .args(["status", "--json", "--root"])
        .arg(fx.root())
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(report["is_running"], true);
    assert_eq!(report["pid"], daemon_pid);

    let stop = memwatch()
        .args(["stop", "--root"])
        .arg(fx.root())
        .output()
        .unwrap();
    assert!(stop.status.success());

    let exit = reaper.join().unwrap().unwrap();
    assert!(exit.success());
    assert!(!pid_file.exists());
    assert!(!state.join("status.json").exists());
}
