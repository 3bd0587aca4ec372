//! Health command - runs the health checks against the daemon for this project

use anyhow::{Context, Result};
use colored::Colorize;

use super::common::Project;
use crate::service::{CheckStatus, HealthCheck, HealthReport, HealthStatus, Service};

/// Returns false when the verdict is unhealthy.
pub fn execute(project: &Project, json: bool) -> Result<bool> {
    let report = report_for(project);

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize health")?;
        println!("{out}");
    } else {
        print_report(&report);
    }
    Ok(!report.is_unhealthy())
}

/// An invalid configuration is itself an unhealthy report, not an error.
fn report_for(project: &Project) -> HealthReport {
    match Service::new(project.config.clone(), &project.root) {
        Ok(service) => service.health_check(),
        Err(e) => HealthReport::from_checks(vec![HealthCheck::fail(e.kind(), e.to_string())]),
    }
}

fn print_report(report: &HealthReport) {
    let verdict = match report.status {
        HealthStatus::Healthy => "healthy".green().bold(),
        HealthStatus::Warning => "warning".yellow().bold(),
        HealthStatus::Unhealthy => "unhealthy".red().bold(),
    };
    println!("memwatch health: {verdict}");
    for check in &report.checks {
        let mark = match check.status {
            CheckStatus::Pass => "✓".green(),
            CheckStatus::Warn => "!".yellow(),
            CheckStatus::Fail => "✗".red(),
        };
        println!("  {mark} {:<16} {}", check.name, check.message.dimmed());
    }
}
