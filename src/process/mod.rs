//! Process utilities for memwatch
//!
//! Liveness checks for PID files, resident memory lookup for the health
//! check, and termination requests used by `memwatch stop`.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::thread;
use std::time::{Duration, Instant};

/// Check if a process with the given PID is alive
///
/// Sends the null signal, so `EPERM` (exists, not ours) still counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Some(pid) = to_nix_pid(pid) else {
        return false;
    };

    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => false,
    }
}

/// Ask a process to terminate with SIGTERM.
///
/// Returns `Ok(false)` when the process no longer exists.
pub fn request_termination(pid: u32) -> nix::Result<bool> {
    let Some(nix_pid) = to_nix_pid(pid) else {
        return Ok(false);
    };

    match kill(nix_pid, Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Poll until `pid` disappears or `timeout` elapses. Returns whether it exited.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(100));
    }
    !is_process_alive(pid)
}

/// Resident set size of a process in bytes, if the platform exposes it.
#[cfg(target_os = "linux")]
pub fn resident_memory_bytes(pid: u32) -> Option<u64> {
    let statm = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages * page_size as u64)
}

/// Resident set size of a process in bytes, if the platform exposes it.
///
/// Without procfs only the current process can be measured, and only its
/// peak resident size.
#[cfg(not(target_os = "linux"))]
pub fn resident_memory_bytes(pid: u32) -> Option<u64> {
    if pid != std::process::id() {
        return None;
    }
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    // SAFETY: getrusage fills the struct on success.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the struct was initialized.
    let usage = unsafe { usage.assume_init() };
    // macOS reports bytes, the BSDs kilobytes.
    let max_rss = usage.ru_maxrss as u64;
    if cfg!(target_os = "macos") {
        Some(max_rss)
    } else {
        Some(max_rss * 1024)
    }
}

fn to_nix_pid(pid: u32) -> Option<Pid> {
    // PID exceeds i32::MAX, treat as non-existent
    i32::try_from(pid).ok().map(Pid::from_raw)
}
