//! PID file: one line holding the daemon's process id.

use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::fs::atomic::{atomic_write, remove_if_exists};
use crate::process::is_process_alive;

pub fn write(path: &Path, pid: u32) -> Result<()> {
    atomic_write(path, &format!("{pid}\n"))
}

/// The recorded pid, if the file exists and parses.
pub fn read(path: &Path) -> Option<u32> {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|pid| *pid > 0)
}

/// The recorded pid, only if that process is alive.
pub fn running_pid(path: &Path) -> Option<u32> {
    read(path).filter(|pid| is_process_alive(*pid))
}

pub fn remove(path: &Path) -> std::io::Result<()> {
    remove_if_exists(path)
}

/// Remove a PID file left behind by a crashed run. Returns true if one was removed.
///
/// Unparsable files count as stale.
pub fn cleanup_stale(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match read(path) {
        Some(pid) if is_process_alive(pid) => false,
        stale => {
            info!(path = %path.display(), pid = ?stale, "removing stale PID file");
            if let Err(e) = remove(path) {
                warn!(path = %path.display(), error = %e, "failed to remove stale PID file");
                return false;
            }
            true
        }
    }
}
