//! Context-aware sleep between retry attempts
//!
//! The sleeper never reports cancellation as an error. When the context is
//! done it simply returns early; the next begin observes the cancelled
//! context and fails promptly.

use std::fmt::Debug;
use std::time::Duration;

use sqltx_core::Context;

/// Pause between attempts, returning early when the context is done
pub trait Sleeper: Send + Sync + Debug {
    /// Sleep for `duration` or until `ctx` is cancelled, whichever is first
    fn sleep(&self, ctx: &Context, duration: Duration);
}

/// Sleeper that parks the calling thread on the context's condition variable
///
/// Cancellation or the context deadline wakes it immediately; nothing is
/// left scheduled after it returns on either path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSleeper;

impl Sleeper for DefaultSleeper {
    fn sleep(&self, ctx: &Context, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let _ = ctx.wait_timeout(duration);
    }
}

/// Sleeper that returns immediately
///
/// Useful in tests and for callers who want retries without delay while
/// still letting the backoff policy bound the total attempt budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _ctx: &Context, _duration: Duration) {}
}
