//! Monitor module for memwatch
//!
//! Owns the singleton lock, the file watcher and the processing thread that
//! drains the event queue into a [`crate::processor::Processor`].

mod config;
pub mod core;
mod dispatch;
pub mod retry;
mod stats;


pub use config::MonitorConfig;
pub use core::{DispatchObserver, Monitor, MonitorState};
pub use dispatch::{DispatchReport, Dispatcher};
pub use retry::{classify, FailureClass, RetryPolicy, RetryState};
pub use stats::{MonitorStats, StatsSnapshot};
