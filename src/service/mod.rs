//! Service lifecycle around the monitor
//!
//! Validates configuration, owns the PID and status files other processes
//! read, aggregates health checks and decides when to restart itself.

mod core;
mod daemon;
pub mod health;
mod pidfile;
mod restart;
pub mod status;

#[cfg(test)]
mod tests;

pub use core::Service;
pub use daemon::daemonize;
pub use health::{CheckStatus, HealthCheck, HealthReport, HealthStatus};
pub use pidfile::running_pid;
pub use restart::RestartPolicy;
pub use status::{ServiceStatus, StatusReport, StatusSource, STATUS_VERSION};
