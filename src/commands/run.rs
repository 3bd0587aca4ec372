//! Run command - runs the service in the current process until signalled

use anyhow::{bail, Result};
use tracing::info;

use super::common::Project;
use crate::service::Service;
use crate::signals::SignalHandler;

/// Usage: memwatch run
pub fn execute(project: &Project) -> Result<()> {
    let mut service = Service::new(project.config.clone(), &project.root)?;
    SignalHandler::register_handlers(&service.shutdown_token())?;

    if !service.start() {
        bail!(
            "Failed to start memwatch for {} (see log output)",
            project.root.display()
        );
    }
    info!(root = %project.root.display(), "memwatch running, send SIGTERM or press Ctrl-C to stop");

    service.supervise();
    Ok(())
}
