//! Start command - launches the daemon

use anyhow::Result;
use colored::Colorize;

use super::common::Project;
use super::run;
use crate::service::{daemonize, running_pid};

/// Usage: memwatch start [--foreground]
pub fn execute(project: &Project, foreground: bool) -> Result<()> {
    if let Some(pid) = running_pid(&project.paths.pid_file) {
        println!(
            "{} memwatch is already running (pid {pid})",
            "─".dimmed()
        );
        return Ok(());
    }

    // Surface configuration errors before detaching from the terminal.
    project.config.validate(&project.root)?;

    if !foreground {
        println!(
            "{} Starting memwatch in background (log: {})",
            "→".cyan().bold(),
            project.paths.log_file.display()
        );
        daemonize(&project.paths.log_file)?;
    }

    run::execute(project)
}
