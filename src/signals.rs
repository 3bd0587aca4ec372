//! Cooperative shutdown
//!
//! SIGINT and SIGTERM (via `ctrlc` with the `termination` feature) trip every
//! registered [`ShutdownToken`]. Nothing is killed: loops poll the token at
//! each iteration boundary and exit on their own.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cloneable cancellation flag shared by every loop of one service instance.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    requested: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.
    pub fn request_shutdown(&self) {
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.cvar.notify_all();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Block for up to `timeout`; returns `true` if shutdown was requested.
    ///
    /// Doubles as an interruptible sleep for retry and restart backoff.
    pub fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while !self.is_shutdown_requested() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.inner.cvar.wait_timeout(guard, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Clear the flag so the owner can be started again.
    pub fn reset(&self) {
        self.inner.requested.store(false, Ordering::SeqCst);
    }

    fn same_as(&self, other: &ShutdownToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Tokens tripped by the process-wide signal handler.
static SUBSCRIBERS: Mutex<Vec<ShutdownToken>> = Mutex::new(Vec::new());

/// Outcome of the one-time `ctrlc` installation.
static INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();

/// Routes OS termination signals to shutdown tokens.
pub struct SignalHandler;

impl SignalHandler {
    /// Install the SIGINT/SIGTERM handler (once per process) and subscribe `token`.
    ///
    /// Calling this again, with the same or another token, is harmless.
    /// Returns `true` if `token` was not subscribed before.
    pub fn register_handlers(token: &ShutdownToken) -> Result<bool> {
        let installed = INSTALLED.get_or_init(|| {
            ctrlc::set_handler(|| {
                info!("termination signal received, requesting shutdown");
                for token in subscribers().iter() {
                    token.request_shutdown();
                }
            })
            .map_err(|e| e.to_string())
        });
        if let Err(e) = installed {
            return Err(anyhow!("Failed to install signal handler: {e}"));
        }

        let mut subs = subscribers();
        if subs.iter().any(|t| t.same_as(token)) {
            return Ok(false);
        }
        subs.push(token.clone());
        debug!(subscribers = subs.len(), "registered shutdown token");
        Ok(true)
    }

    /// Stop routing signals to `token`.
    pub fn unregister(token: &ShutdownToken) {
        subscribers().retain(|t| !t.same_as(token));
    }

    /// Trip every subscribed token as if a signal had arrived.
    pub fn broadcast_shutdown() {
        for token in subscribers().iter() {
            token.request_shutdown();
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count() -> usize {
        subscribers().len()
    }
}

fn subscribers() -> std::sync::MutexGuard<'static, Vec<ShutdownToken>> {
    SUBSCRIBERS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
