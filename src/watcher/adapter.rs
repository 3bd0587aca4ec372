//! Bridges the polling watcher into the event queue.
//!
//! Shapes each poller callback into a [`ChangeEvent`] and offers it to the
//! queue with deduplication. Holds no retry or sync logic.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use super::event::{ChangeEvent, ChangeKind};
use super::poller::{ChangeCallback, PollerConfig, PollingWatcher};
use super::queue::EventQueue;
use crate::signals::ShutdownToken;

pub struct FileWatcher {
    poller: PollingWatcher,
}

impl FileWatcher {
    pub fn new(config: PollerConfig, queue: Arc<EventQueue>) -> Result<Self> {
        let poller = PollingWatcher::new(config)?;
        poller.on_added(enqueue(&queue, ChangeKind::Added));
        poller.on_modified(enqueue(&queue, ChangeKind::Modified));
        poller.on_deleted(enqueue(&queue, ChangeKind::Deleted));
        Ok(Self { poller })
    }

    pub fn add_path(&self, path: &Path) {
        self.poller.add_path(path);
    }

    pub fn remove_path(&self, path: &Path) {
        self.poller.remove_path(path);
    }

    pub fn start(&mut self, shutdown: ShutdownToken) -> Result<()> {
        self.poller.start(shutdown)
    }

    pub fn stop(&mut self) {
        self.poller.stop();
    }

    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    pub fn monitored_files(&self) -> usize {
        self.poller.monitored_files()
    }

    /// Run one poll synchronously; returns how many changes were observed.
    pub fn poll_now(&self) -> usize {
        self.poller.poll_once().len()
    }
}

fn enqueue(queue: &Arc<EventQueue>, kind: ChangeKind) -> ChangeCallback {
    let queue = Arc::clone(queue);
    Arc::new(move |path: &Path| {
        queue.put(ChangeEvent::new(path, kind), true);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn watcher(root: &Path, queue: &Arc<EventQueue>) -> FileWatcher {
        let config = PollerConfig {
            poll_interval: Duration::from_millis(20),
            ..PollerConfig::default()
        };
        let watcher = FileWatcher::new(config, Arc::clone(queue)).unwrap();
        watcher.add_path(root);
        watcher
    }

    #[test]
    fn test_changes_become_queue_events() {
        let temp = TempDir::new().unwrap();
        let queue = Arc::new(EventQueue::default());
        let watcher = watcher(temp.path(), &queue);

        let file = temp.path().join("a.md");
        fs::write(&file, "x").unwrap();
        watcher.poll_now();

        let event = queue.get(Duration::from_millis(50)).unwrap();
        assert_eq!(event.kind(), ChangeKind::Added);
        assert_eq!(event.path(), file);
    }

    #[test]
    fn test_rapid_modifications_coalesce() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.md");
        fs::write(&file, "x").unwrap();

        let queue = Arc::new(EventQueue::default());
        let watcher = watcher(temp.path(), &queue);

        fs::write(&file, "xy").unwrap();
        watcher.poll_now();
        fs::write(&file, "xyz").unwrap();
        watcher.poll_now();

        let first = queue.get(Duration::from_millis(50)).unwrap();
        assert_eq!(first.kind(), ChangeKind::Modified);
        assert!(queue.get(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_monitored_files_pass_through() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.md"), "x").unwrap();
        fs::write(temp.path().join("b.md"), "x").unwrap();

        let queue = Arc::new(EventQueue::default());
        let watcher = watcher(temp.path(), &queue);
        assert_eq!(watcher.monitored_files(), 2);

        watcher.remove_path(temp.path());
        assert_eq!(watcher.monitored_files(), 0);
    }
}
