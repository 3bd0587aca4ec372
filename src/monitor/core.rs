//! The monitor: lock, watcher and a single processing thread.

use chrono::{DateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use super::config::MonitorConfig;
use super::dispatch::{DispatchReport, Dispatcher};
use super::stats::{MonitorStats, StatsSnapshot};
use crate::error::MonitorError;
use crate::lock::SingletonLock;
use crate::processor::Processor;
use crate::signals::{ShutdownToken, SignalHandler};
use crate::watcher::{EventQueue, FileWatcher};

/// Called on the processing thread after every dispatched event.
pub type DispatchObserver = Arc<dyn Fn(&DispatchReport) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Handle on the processing thread plus its exit notification.
struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

pub struct Monitor {
    config: MonitorConfig,
    processor: Arc<dyn Processor>,
    /// Process-wide shutdown (signals); observed, never reset here.
    shutdown: ShutdownToken,
    /// Tripped by `stop`. Replaced on every `start`, so a detached worker
    /// from an earlier run never sees it cleared.
    stop_token: ShutdownToken,
    running: Arc<AtomicBool>,
    /// Whether `start` added `shutdown` to the signal subscribers.
    subscribed: bool,
    state: MonitorState,
    stats: Arc<MonitorStats>,
    queue: Arc<EventQueue>,
    observer: Option<DispatchObserver>,
    lock: Option<SingletonLock>,
    watcher: Option<FileWatcher>,
    worker: Option<Worker>,
    started_at: Option<DateTime<Utc>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        processor: Arc<dyn Processor>,
        shutdown: ShutdownToken,
    ) -> Self {
        let queue = Arc::new(EventQueue::new(config.queue_capacity, config.dedup_window));
        Self {
            config,
            processor,
            shutdown,
            stop_token: ShutdownToken::new(),
            running: Arc::new(AtomicBool::new(false)),
            subscribed: false,
            state: MonitorState::Idle,
            stats: Arc::new(MonitorStats::new()),
            queue,
            observer: None,
            lock: None,
            watcher: None,
            worker: None,
            started_at: None,
        }
    }

    /// Install a callback for dispatch results. Takes effect on the next `start`.
    pub fn set_observer(&mut self, observer: DispatchObserver) {
        self.observer = Some(observer);
    }

    /// Idle -> Starting -> Running. Any failure returns to Idle with nothing held.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.state != MonitorState::Idle {
            warn!(state = ?self.state, "start requested while monitor is not idle");
            return Err(MonitorError::AlreadyRunning);
        }
        self.state = MonitorState::Starting;

        match self.start_inner() {
            Ok(()) => {
                self.state = MonitorState::Running;
                self.started_at = Some(Utc::now());
                info!(path = %self.config.watch_path.display(), "monitor running");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.stop_token.request_shutdown();
                if let Some(mut watcher) = self.watcher.take() {
                    watcher.stop();
                }
                if let Some(mut lock) = self.lock.take() {
                    lock.release();
                }
                self.state = MonitorState::Idle;
                Err(e)
            }
        }
    }

    fn start_inner(&mut self) -> Result<(), MonitorError> {
        self.lock = Some(SingletonLock::acquire(&self.config.lock_path)?);

        match SignalHandler::register_handlers(&self.shutdown) {
            Ok(added) => self.subscribed |= added,
            Err(e) => warn!(error = %e, "continuing without signal handlers"),
        }

        let mut watcher = FileWatcher::new(self.config.poller.clone(), Arc::clone(&self.queue))
            .map_err(|e| MonitorError::Watcher(format!("{e:#}")))?;
        watcher.add_path(&self.config.watch_path);
        watcher
            .start(self.shutdown.clone())
            .map_err(|e| MonitorError::Watcher(format!("{e:#}")))?;
        self.watcher = Some(watcher);

        self.stop_token = ShutdownToken::new();
        self.running = Arc::new(AtomicBool::new(true));
        self.worker = Some(self.spawn_worker()?);
        Ok(())
    }

    fn spawn_worker(&self) -> Result<Worker, MonitorError> {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.processor),
            self.config.retry,
            Arc::clone(&self.stats),
            self.stop_token.clone(),
        );
        let ctx = WorkerContext {
            dispatcher,
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
            running: Arc::clone(&self.running),
            shutdown: self.shutdown.clone(),
            stop: self.stop_token.clone(),
            observer: self.observer.clone(),
            queue_timeout: self.config.queue_timeout,
        };
        let (done_tx, done) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("memwatch-processor".to_string())
            .spawn(move || {
                ctx.run();
                let _ = done_tx.send(());
            })
            .map_err(MonitorError::Spawn)?;
        Ok(Worker { handle, done })
    }

    /// Running -> Stopping -> Idle. Never blocks longer than the join timeout.
    pub fn stop(&mut self) {
        if self.state == MonitorState::Idle {
            return;
        }
        self.state = MonitorState::Stopping;
        info!("stopping monitor");

        self.running.store(false, Ordering::SeqCst);
        self.stop_token.request_shutdown();

        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }

        if let Some(worker) = self.worker.take() {
            match worker.done.recv_timeout(self.config.join_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        error!("processing thread panicked");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout_ms = self.config.join_timeout.as_millis() as u64,
                        "processing thread did not exit in time, detaching"
                    );
                }
            }
        }

        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }
        self.state = MonitorState::Idle;
        info!("monitor stopped");
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == MonitorState::Running
    }

    /// Whether the poll thread is alive.
    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(FileWatcher::is_running)
    }

    pub fn monitored_files(&self) -> usize {
        self.watcher
            .as_ref()
            .map(FileWatcher::monitored_files)
            .unwrap_or(0)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
        if self.subscribed {
            SignalHandler::unregister(&self.shutdown);
        }
    }
}

/// Everything the processing thread owns.
struct WorkerContext {
    dispatcher: Dispatcher,
    queue: Arc<EventQueue>,
    stats: Arc<MonitorStats>,
    running: Arc<AtomicBool>,
    shutdown: ShutdownToken,
    stop: ShutdownToken,
    observer: Option<DispatchObserver>,
    queue_timeout: std::time::Duration,
}

impl WorkerContext {
    fn should_exit(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
            || self.stop.is_shutdown_requested()
            || self.shutdown.is_shutdown_requested()
    }

    fn run(&self) {
        debug!("processing thread started");
        while !self.should_exit() {
            let Some(event) = self.queue.get(self.queue_timeout) else {
                continue;
            };
            self.stats.record_received();

            let report = match panic::catch_unwind(AssertUnwindSafe(|| {
                self.dispatcher.dispatch(&event)
            })) {
                Ok(report) => report,
                Err(_) => {
                    error!(event = %event, "processor panicked");
                    self.stats.record_call();
                    self.stats.record_failure("processor panicked", false);
                    DispatchReport {
                        event: event.clone(),
                        success: false,
                        attempts: 1,
                        error: Some("processor panicked".to_string()),
                        elapsed: std::time::Duration::ZERO,
                    }
                }
            };

            if let Some(observer) = &self.observer {
                if panic::catch_unwind(AssertUnwindSafe(|| observer(&report))).is_err() {
                    error!("dispatch observer panicked");
                }
            }
        }
        debug!("processing thread exiting");
    }
}
