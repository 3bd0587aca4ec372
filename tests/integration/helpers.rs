//! Shared helpers: temp projects and fake sync tools

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use memwatch::config::SyncConfig;

/// A project directory plus a separate directory for fake tools, so the
/// tools and their call logs are never themselves watched.
pub struct Fixture {
    pub project: TempDir,
    pub tools: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            project: TempDir::new().expect("Failed to create project dir"),
            tools: TempDir::new().expect("Failed to create tools dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.project.path()
    }

    pub fn calls_log(&self) -> PathBuf {
        self.tools.path().join("calls.log")
    }

    /// Write a shell script that logs its arguments and exits with `exit_code`.
    pub fn fake_tool(&self, exit_code: i32, stderr: &str) -> PathBuf {
        let path = self.tools.path().join(format!("memctl-{exit_code}.sh"));
        let mut script = format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\n",
            self.calls_log().display()
        );
        if !stderr.is_empty() {
            script.push_str(&format!("echo '{stderr}' >&2\n"));
        }
        script.push_str(&format!("exit {exit_code}\n"));
        fs::write(&path, script).expect("Failed to write fake tool");
        path
    }

    /// Fast-polling configuration that syncs through `tool`.
    pub fn config(&self, tool: &Path) -> SyncConfig {
        SyncConfig {
            poll_interval_ms: 50,
            retry_delay_ms: 10,
            restart_settle_ms: 10,
            memory_threshold_mb: 1_000_000,
            command: vec!["sh".to_string(), tool.display().to_string()],
            ..SyncConfig::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.calls_log())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn write(&self, name: &str, content: &str) {
        fs::write(self.root().join(name), content).expect("Failed to write project file");
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    condition()
}
