//! Stop command - gracefully shuts down the daemon

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::time::Duration;

use super::common::Project;
use crate::process::{request_termination, wait_for_exit};
use crate::service::running_pid;

/// Send SIGTERM to the daemon and wait up to `timeout` for it to exit.
pub fn execute(project: &Project, timeout: Duration) -> Result<()> {
    let Some(pid) = running_pid(&project.paths.pid_file) else {
        println!("{} memwatch is not running", "─".dimmed());
        return Ok(());
    };

    println!("{} Stopping memwatch (pid {pid})...", "→".cyan().bold());
    let signalled = request_termination(pid)
        .with_context(|| format!("Failed to signal process {pid}"))?;

    if signalled && !wait_for_exit(pid, timeout) {
        bail!(
            "memwatch did not exit within {}s. Try: kill {pid}",
            timeout.as_secs()
        );
    }

    println!("{} memwatch stopped", "✓".green().bold());
    Ok(())
}
