//! Cancellation context for transaction runs
//!
//! A [`Context`] is a cheaply cloneable cancellation signal with an optional
//! deadline. Clones share state: cancelling any clone cancels all of them.
//! It is passed to the beginner, visible to the transaction body, and used
//! by the sleeper between attempts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Reason a context is no longer live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// `cancel()` was called
    #[error("context canceled")]
    Canceled,
    /// The deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

struct ContextInner {
    canceled: Mutex<bool>,
    signal: Condvar,
    deadline: Option<Instant>,
}

/// Cancellation signal shared between a caller and a transaction run
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A context that is never cancelled unless `cancel()` is called
    pub fn background() -> Self {
        Self::build(None)
    }

    /// A context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// A context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                canceled: Mutex::new(false),
                signal: Condvar::new(),
                deadline,
            }),
        }
    }

    /// Cancel the context and wake every waiter
    pub fn cancel(&self) {
        let mut canceled = self.inner.canceled.lock();
        *canceled = true;
        self.inner.signal.notify_all();
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ContextError> {
        if *self.inner.canceled.lock() {
            return Some(ContextError::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether the context is cancelled or past its deadline
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Block for up to `timeout`, returning early if the context is done.
    ///
    /// Returns `Some(reason)` when woken by cancellation or the deadline and
    /// `None` when the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ContextError> {
        let start = Instant::now();
        let wake_at = start.checked_add(timeout);
        let mut canceled = self.inner.canceled.lock();

        loop {
            if *canceled {
                return Some(ContextError::Canceled);
            }

            let now = Instant::now();
            if let Some(deadline) = self.inner.deadline {
                if now >= deadline {
                    return Some(ContextError::DeadlineExceeded);
                }
            }
            let target = match (wake_at, self.inner.deadline) {
                (Some(w), Some(d)) => w.min(d),
                (Some(w), None) => w,
                (None, Some(d)) => d,
                (None, None) => {
                    // Unbounded wait: only cancellation can end it
                    self.inner.signal.wait(&mut canceled);
                    continue;
                }
            };
            if wake_at.map_or(false, |w| now >= w) {
                return None;
            }

            // Spurious wakeups loop back and re-check both conditions
            let _ = self.inner.signal.wait_until(&mut canceled, target);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("done", &self.err())
            .finish()
    }
}
