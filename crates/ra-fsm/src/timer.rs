//! Cancellable single-shot timer
//!
//! Each [`Timer::start`] cancels whatever was pending and returns a fresh
//! [`TimerToken`]. The callback receives its token so the owner can check
//! [`Timer::is_current`] when the notification arrives; a notification that
//! was already queued when the timer was cancelled or restarted is stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// Identifies one `start` of a [`Timer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Single-shot delayed callback with at most one pending callback
#[derive(Debug, Default)]
pub struct Timer {
    generation: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `duration`, replacing any pending callback
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&mut self, duration: Duration, callback: F) -> TimerToken
    where
        F: FnOnce(TimerToken) + Send + 'static,
    {
        self.cancel();

        let current = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = TimerToken(current);
        let generation = self.generation.clone();

        trace!(?duration, generation = current, "Starting timer");
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Abort may lose the race against a sleep that already completed
            if generation.load(Ordering::SeqCst) == current {
                callback(token);
            }
        }));

        token
    }

    /// Cancel the pending callback, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            handle.abort();
            trace!("Timer cancelled");
        }
    }

    /// True while a started callback has neither run nor been cancelled
    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// True if `token` belongs to the most recent, uncancelled `start`
    pub fn is_current(&self, token: TimerToken) -> bool {
        self.handle.is_some() && self.generation.load(Ordering::SeqCst) == token.0
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}
