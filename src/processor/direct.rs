//! In-process alternative to subprocess delegation.
//!
//! Calls straight into a [`MemoryStore`] instead of spawning the sync tool.
//! Retry and classification still happen in the monitor; failures are
//! reported with `exit_code: None` and the error text as stderr.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{ProcessOutcome, Processor};
use crate::watcher::{ChangeEvent, ChangeKind};

/// The two memory-store operations the daemon relies on.
pub trait MemoryStore: Send + Sync {
    /// Store the content of a source file as a new experience.
    fn store_experience(&self, source: &Path, content: &str) -> anyhow::Result<()>;

    /// Delete every memory derived from `source`; returns how many were removed.
    fn delete_by_source(&self, source: &Path) -> anyhow::Result<usize>;

    /// Whether the store is reachable.
    fn is_available(&self) -> bool {
        true
    }
}

/// Applies events directly to a [`MemoryStore`].
pub struct DirectProcessor {
    store: Arc<dyn MemoryStore>,
    project_root: PathBuf,
}

impl DirectProcessor {
    pub fn new(store: Arc<dyn MemoryStore>, project_root: &Path) -> Self {
        Self {
            store,
            project_root: project_root.to_path_buf(),
        }
    }

    fn source_key<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.project_root).unwrap_or(path)
    }

    fn load(&self, event: &ChangeEvent) -> anyhow::Result<String> {
        let source = self.source_key(event.path());
        let content = fs::read_to_string(event.path())?;
        // Replace, don't append: earlier versions of the file are stale.
        let removed = self.store.delete_by_source(source)?;
        self.store.store_experience(source, &content)?;
        Ok(format!("stored {} ({removed} replaced)", source.display()))
    }

    fn remove(&self, event: &ChangeEvent) -> anyhow::Result<String> {
        let source = self.source_key(event.path());
        let removed = self.store.delete_by_source(source)?;
        Ok(format!("removed {removed} memories for {}", source.display()))
    }
}

impl Processor for DirectProcessor {
    fn name(&self) -> &str {
        "direct"
    }

    fn apply(&self, event: &ChangeEvent) -> ProcessOutcome {
        let result = match event.kind() {
            ChangeKind::Added | ChangeKind::Modified => self.load(event),
            ChangeKind::Deleted => self.remove(event),
        };
        match result {
            Ok(stdout) => {
                debug!(event = %event, "{stdout}");
                ProcessOutcome::Success {
                    stdout,
                    stderr: String::new(),
                }
            }
            Err(e) => {
                // Keep the io wording so a vanished file classifies as permanent.
                let stderr = match e.downcast_ref::<std::io::Error>() {
                    Some(io) if io.kind() == ErrorKind::NotFound => {
                        format!("{}: No such file or directory", event.path().display())
                    }
                    _ => format!("{e:#}"),
                };
                ProcessOutcome::Failed {
                    exit_code: None,
                    stdout: String::new(),
                    stderr,
                }
            }
        }
    }

    fn check_available(&self) -> Result<(), String> {
        if self.store.is_available() {
            Ok(())
        } else {
            Err("memory store unavailable".to_string())
        }
    }
}
