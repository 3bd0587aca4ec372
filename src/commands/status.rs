//! Status command - prints what the daemon last reported about itself

use anyhow::{Context, Result};
use colored::Colorize;

use super::common::Project;
use crate::service::{ServiceStatus, StatusReport, StatusSource};

/// Usage: memwatch status [--json]
pub fn execute(project: &Project, json: bool) -> Result<()> {
    let report = StatusReport::query(&project.paths);

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
        println!("{out}");
        return Ok(());
    }

    println!("{}", "memwatch status".bold());
    println!("  Root:      {}", project.root.display());
    match (report.source, report.pid) {
        (StatusSource::PidFile, _) | (_, None) => {
            println!("  State:     {}", "not running".red());
        }
        (StatusSource::Unknown, Some(pid)) => {
            println!("  State:     {} (pid {pid})", "running".green());
            println!("  Details:   {}", "status file unavailable".yellow());
        }
        (StatusSource::StatusFile, Some(pid)) => {
            println!("  State:     {} (pid {pid})", "running".green());
            if let Some(status) = &report.status {
                print_details(status);
            }
        }
    }
    Ok(())
}

fn print_details(status: &ServiceStatus) {
    if let Some(started) = status.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("  Files:     {}", status.files_monitored);
    match status.last_sync_time {
        Some(last) => println!(
            "  Synced:    {} (last {})",
            status.sync_operations,
            last.format("%H:%M:%S")
        ),
        None => println!("  Synced:    {}", status.sync_operations),
    }
    let errors = status.error_count.to_string();
    match &status.last_error {
        Some(last) if status.error_count > 0 => {
            println!("  Errors:    {} (last: {})", errors.red(), last.dimmed())
        }
        _ => println!("  Errors:    {errors}"),
    }
    println!("  Restarts:  {}", status.restart_count);
}
