//! Bounded, deduplicating event queue between the poller and the processing thread
//!
//! Producers never block: a full queue drops the event with a warning. The
//! consumer blocks only in [`EventQueue::get`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::event::{ChangeEvent, ChangeKind};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default window within which a repeat (path, kind) is dropped.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(1);

/// Recent-events table size that triggers a trim.
const RECENT_HIGH_WATER: usize = 100;

/// Entries kept after a trim.
const RECENT_KEEP: usize = 50;

type DedupKey = (PathBuf, ChangeKind);

/// Thread-safe FIFO of [`ChangeEvent`]s.
pub struct EventQueue {
    sender: SyncSender<ChangeEvent>,
    receiver: Mutex<Receiver<ChangeEvent>>,
    /// Last enqueue time per (path, kind); only consulted for dedup.
    recent: Mutex<HashMap<DedupKey, Instant>>,
    dedup_window: Duration,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize, dedup_window: Duration) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            recent: Mutex::new(HashMap::new()),
            dedup_window,
            capacity,
        }
    }

    /// Offer an event. Returns `true` if it was actually enqueued.
    ///
    /// With `deduplicate`, an event matching the path and kind of one enqueued
    /// within the dedup window is dropped, and the earlier timestamp is kept.
    pub fn put(&self, event: ChangeEvent, deduplicate: bool) -> bool {
        let key = (event.path().to_path_buf(), event.kind());
        let now = Instant::now();

        // Held across the send so concurrent duplicates cannot both pass the check.
        let mut recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if deduplicate {
            if let Some(last) = recent.get(&key) {
                if now.duration_since(*last) < self.dedup_window {
                    debug!(event = %event, "dropping duplicate event");
                    return false;
                }
            }
        }

        match self.sender.try_send(event) {
            Ok(()) => {
                recent.insert(key, now);
                if recent.len() > RECENT_HIGH_WATER {
                    trim_recent(&mut recent);
                }
                true
            }
            Err(TrySendError::Full(event)) => {
                warn!(event = %event, capacity = self.capacity, "event queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                warn!(event = %event, "event queue closed, dropping event");
                false
            }
        }
    }

    /// Wait up to `timeout` for the next event; `None` on expiry.
    pub fn get(&self, timeout: Duration) -> Option<ChangeEvent> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of entries in the dedup table.
    pub fn recent_len(&self) -> usize {
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_DEDUP_WINDOW)
    }
}

/// Keep only the most recently enqueued entries.
fn trim_recent(recent: &mut HashMap<DedupKey, Instant>) {
    let mut entries: Vec<(DedupKey, Instant)> = recent.drain().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(RECENT_KEEP);
    recent.extend(entries);
}
