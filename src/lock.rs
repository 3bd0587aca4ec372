//! Singleton lock: one running monitor per lock file
//!
//! Uses a non-blocking `fs2` exclusive lock on `<state_dir>/memwatch.lock`.
//! The OS drops the lock when the holding process dies, so a lock file left by
//! a crashed daemon is simply re-locked and overwritten with the new pid.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::LockError;

/// Bound on retries when the lock file is swapped out underneath us.
const MAX_ACQUIRE_ATTEMPTS: usize = 5;

/// Exclusive, cross-process lock held for the lifetime of a running monitor.
///
/// Released on `release()` or on drop, whichever comes first.
#[derive(Debug)]
pub struct SingletonLock {
    path: PathBuf,
    file: Option<File>,
    pid: u32,
}

impl SingletonLock {
    /// Acquire the lock, failing immediately if another holder exists.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            // No truncation before the lock is ours: the current holder's pid stays readable.
            #[allow(clippy::suspicious_open_options)]
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)
                .map_err(io_err)?;

            if let Err(e) = file.try_lock_exclusive() {
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
                {
                    debug!(path = %path.display(), "singleton lock is held by another instance");
                    return Err(LockError::AlreadyRunning {
                        path: path.to_path_buf(),
                    });
                }
                return Err(io_err(e));
            }

            // A releasing holder unlinks the file; if we locked that orphaned inode, start over.
            if !same_file(&file, path) {
                debug!(path = %path.display(), "lock file replaced while locking, retrying");
                continue;
            }

            let pid = std::process::id();
            write_pid(&mut file, pid).map_err(io_err)?;
            debug!(path = %path.display(), pid, "acquired singleton lock");

            return Ok(Self {
                path: path.to_path_buf(),
                file: Some(file),
                pid,
            });
        }

        Err(LockError::AlreadyRunning {
            path: path.to_path_buf(),
        })
    }

    /// Unlock, close and delete the lock file. Safe to call more than once.
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // Delete while still locked so a waiting acquirer never locks the old inode.
        if let Err(e) = crate::fs::atomic::remove_if_exists(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
        if let Err(e) = FileExt::unlock(&file) {
            warn!(path = %self.path.display(), error = %e, "failed to unlock lock file");
        }
        drop(file);
        debug!(path = %self.path.display(), "released singleton lock");
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid recorded in the lock file by this holder.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Read the pid recorded in a lock file, if any.
    pub fn read_holder(path: &Path) -> Option<u32> {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
    }
}

impl Drop for SingletonLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn write_pid(file: &mut File, pid: u32) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{pid}")?;
    file.flush()
}
