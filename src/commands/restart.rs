//! Restart command - stop the daemon, then start it again in the background

use anyhow::Result;
use std::time::Duration;

use super::common::Project;
use super::{start, stop};

pub fn execute(project: &Project, timeout: Duration) -> Result<()> {
    stop::execute(project, timeout)?;
    std::thread::sleep(project.config.restart_settle());
    start::execute(project, false)
}
