//! Subprocess delegation: `<tool> load <path>` / `<tool> remove-file <path>`

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::{ErrorKind, Read};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use wait_timeout::ChildExt;

use super::{ProcessOutcome, Processor};
use crate::watcher::{ChangeEvent, ChangeKind};

/// Default per-attempt timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for collecting output from child process pipes
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum captured output per stream (1MB)
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Runs the external sync tool once per event.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    /// Tool followed by any leading arguments.
    command: Vec<String>,
    project_root: PathBuf,
    timeout: Duration,
}

impl CommandProcessor {
    pub fn new(command: Vec<String>, project_root: &Path, timeout: Duration) -> Self {
        Self {
            command,
            project_root: project_root.to_path_buf(),
            timeout,
        }
    }

    /// Arguments appended after the tool for a given event.
    pub fn subcommand_for(&self, event: &ChangeEvent) -> Vec<String> {
        let verb = match event.kind() {
            ChangeKind::Added | ChangeKind::Modified => "load",
            ChangeKind::Deleted => "remove-file",
        };
        let path = event
            .path()
            .strip_prefix(&self.project_root)
            .unwrap_or(event.path());
        vec![verb.to_string(), path.display().to_string()]
    }

    fn spawn(&self, tool: &str, args: &[String]) -> std::io::Result<Child> {
        Command::new(tool)
            .args(args)
            .current_dir(&self.project_root)
            // Own group, so a timeout can take down anything the tool forked
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

impl Processor for CommandProcessor {
    fn name(&self) -> &str {
        "command"
    }

    fn apply(&self, event: &ChangeEvent) -> ProcessOutcome {
        let Some((tool, leading)) = self.command.split_first() else {
            return ProcessOutcome::Rejected {
                reason: "no sync command configured".to_string(),
            };
        };
        let mut args = leading.to_vec();
        args.extend(self.subcommand_for(event));
        debug!(tool = %tool, args = ?args, "dispatching sync command");

        let start = Instant::now();
        let mut child = match self.spawn(tool, &args) {
            Ok(child) => child,
            Err(e) => return spawn_failure(tool, &e),
        };

        // Drain pipes while waiting, or a chatty child blocks on a full pipe.
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let wait_result = child.wait_timeout(self.timeout);
        let timed_out = matches!(wait_result, Ok(None));
        if timed_out {
            kill_child_process(&mut child);
        }

        let stdout = collect(stdout_rx);
        let stderr = collect(stderr_rx);
        debug!(tool = %tool, elapsed_ms = start.elapsed().as_millis() as u64, "sync command finished");

        match wait_result {
            Ok(Some(status)) if status.success() => ProcessOutcome::Success { stdout, stderr },
            Ok(Some(status)) => ProcessOutcome::Failed {
                exit_code: status.code(),
                stdout,
                stderr,
            },
            Ok(None) => ProcessOutcome::TimedOut {
                timeout: self.timeout,
                stdout,
                stderr,
            },
            Err(e) => {
                kill_child_process(&mut child);
                ProcessOutcome::Failed {
                    exit_code: None,
                    stdout,
                    stderr: format!("{stderr}\nfailed to wait for {tool}: {e}"),
                }
            }
        }
    }

    fn check_available(&self) -> Result<(), String> {
        let Some(tool) = self.command.first() else {
            return Err("no sync command configured".to_string());
        };
        let as_path = Path::new(tool);
        if as_path.components().count() > 1 {
            let resolved = if as_path.is_absolute() {
                as_path.to_path_buf()
            } else {
                self.project_root.join(as_path)
            };
            return if resolved.is_file() {
                Ok(())
            } else {
                Err(format!("sync tool not found: {}", resolved.display()))
            };
        }
        which::which(tool)
            .map(|_| ())
            .map_err(|e| format!("sync tool '{tool}' not found on PATH: {e}"))
    }
}

/// Map spawn errors onto the shell's conventional exit codes.
fn spawn_failure(tool: &str, e: &std::io::Error) -> ProcessOutcome {
    let (code, message) = match e.kind() {
        ErrorKind::NotFound => (127, format!("{tool}: command not found")),
        ErrorKind::PermissionDenied => (126, format!("{tool}: permission denied")),
        _ => (1, format!("{tool}: failed to spawn: {e}")),
    };
    ProcessOutcome::Failed {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: message,
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    match stream {
        Some(stream) => {
            thread::spawn(move || {
                let _ = tx.send(read_stream_to_string(stream));
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}

fn collect(rx: mpsc::Receiver<String>) -> String {
    rx.recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
        .unwrap_or_else(|_| "[output collection timed out]".to_string())
}

/// Read a stream to string, capped at `MAX_OUTPUT_SIZE`.
///
/// Past the cap the stream is still drained so the child never sees EPIPE.
fn read_stream_to_string<R: Read>(mut stream: R) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let remaining = MAX_OUTPUT_SIZE.saturating_sub(buf.len());
                let to_copy = n.min(remaining);
                buf.extend_from_slice(&chunk[..to_copy]);
                truncated |= to_copy < n;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        text.push_str("\n[output truncated]");
    }
    text
}

fn kill_child_process(child: &mut Child) {
    // The group may already be gone
    if let Ok(pgid) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}
