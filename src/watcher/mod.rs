//! File watching: polling, event shaping and the bounded event queue.

mod adapter;
mod event;
mod poller;
mod queue;

pub use adapter::FileWatcher;
pub use event::{ChangeEvent, ChangeKind};
pub use poller::{ChangeCallback, PollerConfig, PollingWatcher};
pub use queue::{EventQueue, DEFAULT_DEDUP_WINDOW, DEFAULT_QUEUE_CAPACITY};
