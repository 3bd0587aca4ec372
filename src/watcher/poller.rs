//! Polling file-state tracker
//!
//! Snapshots `path -> (mtime, size)` for every watched root and diffs the
//! snapshot on each poll. The first scan after `start` (or after `add_path`)
//! is a silent baseline; only later differences produce callbacks.

use anyhow::{Context, Result};
use glob::Pattern;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, trace, warn};

use super::event::ChangeKind;
use crate::signals::ShutdownToken;

/// Callback invoked with the path of a changed file.
pub type ChangeCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Settings for the polling loop and path filtering.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    /// File-name globs to report; empty reports everything.
    pub include: Vec<String>,
    /// Globs matched against every path component and the relative path.
    pub ignore: Vec<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            include: Vec::new(),
            ignore: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileState {
    mtime: Option<SystemTime>,
    size: u64,
}

#[derive(Default)]
struct Callbacks {
    added: Option<ChangeCallback>,
    modified: Option<ChangeCallback>,
    deleted: Option<ChangeCallback>,
}

/// Compiled include/ignore patterns.
#[derive(Debug, Clone)]
struct PathFilter {
    include: Vec<Pattern>,
    ignore: Vec<Pattern>,
}

impl PathFilter {
    fn new(config: &PollerConfig) -> Result<Self> {
        let compile = |globs: &[String]| -> Result<Vec<Pattern>> {
            globs
                .iter()
                .map(|g| Pattern::new(g).with_context(|| format!("Invalid glob pattern: {g}")))
                .collect()
        };
        Ok(Self {
            include: compile(&config.include)?,
            ignore: compile(&config.ignore)?,
        })
    }

    fn is_ignored(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        if self.ignore.iter().any(|p| p.matches_path(relative)) {
            return true;
        }
        relative.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            self.ignore.iter().any(|p| p.matches(&name))
        })
    }

    fn is_included(&self, path: &Path) -> bool {
        if self.include.is_empty() {
            return true;
        }
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.include.iter().any(|p| p.matches(&name))
    }
}

struct PollerShared {
    roots: Mutex<Vec<PathBuf>>,
    snapshot: Mutex<HashMap<PathBuf, FileState>>,
    callbacks: Mutex<Callbacks>,
    filter: PathFilter,
    running: AtomicBool,
    stop: ShutdownToken,
}

/// Polls watched roots and reports added, modified and deleted files.
pub struct PollingWatcher {
    config: PollerConfig,
    shared: Arc<PollerShared>,
    handle: Option<JoinHandle<()>>,
}

impl PollingWatcher {
    pub fn new(config: PollerConfig) -> Result<Self> {
        let filter = PathFilter::new(&config)?;
        Ok(Self {
            config,
            shared: Arc::new(PollerShared {
                roots: Mutex::new(Vec::new()),
                snapshot: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(Callbacks::default()),
                filter,
                running: AtomicBool::new(false),
                stop: ShutdownToken::new(),
            }),
            handle: None,
        })
    }

    pub fn on_added(&self, callback: ChangeCallback) {
        lock(&self.shared.callbacks).added = Some(callback);
    }

    pub fn on_modified(&self, callback: ChangeCallback) {
        lock(&self.shared.callbacks).modified = Some(callback);
    }

    pub fn on_deleted(&self, callback: ChangeCallback) {
        lock(&self.shared.callbacks).deleted = Some(callback);
    }

    /// Watch a file or directory tree. Existing files form a silent baseline.
    pub fn add_path(&self, path: &Path) {
        {
            let mut roots = lock(&self.shared.roots);
            if roots.iter().any(|r| r == path) {
                return;
            }
            roots.push(path.to_path_buf());
        }
        let found = self.shared.scan_root(path);
        debug!(path = %path.display(), files = found.len(), "watching path");
        lock(&self.shared.snapshot).extend(found);
    }

    /// Stop watching a root and forget its files without reporting them deleted.
    pub fn remove_path(&self, path: &Path) {
        lock(&self.shared.roots).retain(|r| r != path);
        lock(&self.shared.snapshot).retain(|p, _| !p.starts_with(path));
        debug!(path = %path.display(), "stopped watching path");
    }

    /// Start the poll thread. `shutdown` is checked once per interval.
    pub fn start(&mut self, shutdown: ShutdownToken) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.stop.reset();
        self.shared.rebaseline();

        let shared = Arc::clone(&self.shared);
        let interval = self.config.poll_interval;
        let handle = thread::Builder::new()
            .name("memwatch-poller".to_string())
            .spawn(move || {
                while !shared.stop.wait_for_shutdown(interval) {
                    if shutdown.is_shutdown_requested() {
                        debug!("poller observed shutdown request");
                        break;
                    }
                    shared.poll_once();
                }
                shared.running.store(false, Ordering::SeqCst);
            });

        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(e).context("Failed to spawn poller thread")
            }
        }
    }

    /// Stop the poll thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.shared.stop.request_shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("poller thread panicked");
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Number of files currently tracked.
    pub fn monitored_files(&self) -> usize {
        lock(&self.shared.snapshot).len()
    }

    /// Diff every root against the snapshot once and fire callbacks.
    pub fn poll_once(&self) -> Vec<(ChangeKind, PathBuf)> {
        self.shared.poll_once()
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl PollerShared {
    fn rebaseline(&self) {
        let roots = lock(&self.roots).clone();
        let mut snapshot = HashMap::new();
        for root in &roots {
            snapshot.extend(self.scan_root(root));
        }
        *lock(&self.snapshot) = snapshot;
    }

    fn poll_once(&self) -> Vec<(ChangeKind, PathBuf)> {
        let roots = lock(&self.roots).clone();
        let mut current = HashMap::new();
        for root in &roots {
            current.extend(self.scan_root(root));
        }

        let changes = {
            let mut snapshot = lock(&self.snapshot);
            let mut changes = Vec::new();
            for (path, state) in &current {
                match snapshot.get(path) {
                    None => changes.push((ChangeKind::Added, path.clone())),
                    Some(old) if old != state => changes.push((ChangeKind::Modified, path.clone())),
                    Some(_) => {}
                }
            }
            for path in snapshot.keys() {
                if !current.contains_key(path) {
                    changes.push((ChangeKind::Deleted, path.clone()));
                }
            }
            *snapshot = current;
            changes
        };

        if !changes.is_empty() {
            trace!(count = changes.len(), "poll found changes");
            let callbacks = lock(&self.callbacks);
            for (kind, path) in &changes {
                let callback = match kind {
                    ChangeKind::Added => &callbacks.added,
                    ChangeKind::Modified => &callbacks.modified,
                    ChangeKind::Deleted => &callbacks.deleted,
                };
                if let Some(cb) = callback {
                    cb(path);
                }
            }
        }
        changes
    }

    fn scan_root(&self, root: &Path) -> HashMap<PathBuf, FileState> {
        let mut found = HashMap::new();
        match fs::symlink_metadata(root) {
            Ok(meta) if meta.is_file() => {
                if self.filter.is_included(root) {
                    found.insert(root.to_path_buf(), file_state(&meta));
                }
            }
            Ok(meta) if meta.is_dir() => self.scan_dir(root, root, &mut found),
            Ok(_) => {}
            Err(e) => trace!(path = %root.display(), error = %e, "watch root not readable"),
        }
        found
    }

    fn scan_dir(&self, root: &Path, dir: &Path, found: &mut HashMap<PathBuf, FileState>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                trace!(path = %dir.display(), error = %e, "skipping unreadable directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if self.filter.is_ignored(root, &path) {
                continue;
            }
            // Symlinks are not followed, so cycles cannot occur.
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if meta.is_dir() {
                self.scan_dir(root, &path, found);
            } else if meta.is_file() && self.filter.is_included(&path) {
                found.insert(path, file_state(&meta));
            }
        }
    }
}

fn file_state(meta: &fs::Metadata) -> FileState {
    FileState {
        mtime: meta.modified().ok(),
        size: meta.len(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
