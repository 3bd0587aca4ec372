//! Detach the current process into a background daemon.

use anyhow::{bail, Context, Result};
use nix::unistd::{fork, setsid, ForkResult};
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Double fork, new session, stdio redirected to `log_path`.
///
/// Returns only in the daemon process; both parents exit. Must be called
/// before any threads are spawned.
pub fn daemonize(log_path: &Path) -> Result<()> {
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    // SAFETY: single-threaded at this point; the parent only exits.
    match unsafe { fork() }.context("First fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;

    // Second fork - prevents acquiring a controlling terminal
    // SAFETY: as above.
    match unsafe { fork() }.context("Second fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;
    let dev_null = File::open("/dev/null").context("Failed to open /dev/null")?;

    // SAFETY: both descriptors are open for the duration of the calls.
    unsafe {
        if libc::dup2(dev_null.as_raw_fd(), 0) < 0 {
            bail!("Failed to redirect stdin");
        }
        if libc::dup2(log_file.as_raw_fd(), 1) < 0 {
            bail!("Failed to redirect stdout");
        }
        if libc::dup2(log_file.as_raw_fd(), 2) < 0 {
            bail!("Failed to redirect stderr");
        }
    }
    Ok(())
}
