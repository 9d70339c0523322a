//! Request-scoped cancellation and deadlines.
//!
//! A [`Context`] carries an optional deadline and a cancel flag. Blocking
//! driver calls (`query`, `prepare`, `execute`) check it before touching
//! the engine, convert any remaining deadline into the engine's
//! millisecond query timeout, and race it against call completion from a
//! watcher thread that fires the connection's interrupt when the context
//! is done first.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::LadybugError;

#[derive(Debug, Default)]
struct Shared {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

/// Deadline/cancel signal scoped to one or more driver calls.
///
/// Contexts are cheap to clone; clones share the same cancel flag.
#[derive(Debug, Clone)]
pub struct Context {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
}

/// Cancels the [`Context`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Cancel the context. Idempotent; wakes any watcher promptly.
    pub fn cancel(&self) {
        let mut cancelled = self.shared.cancelled.lock().expect("context lock poisoned");
        *cancelled = true;
        self.shared.cv.notify_all();
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Context {
            shared: Arc::new(Shared::default()),
            deadline: None,
        }
    }

    /// A context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Context {
            shared: Arc::new(Shared::default()),
            deadline: Some(deadline),
        }
    }

    /// A context plus the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let ctx = Self::background();
        let handle = CancelHandle {
            shared: ctx.shared.clone(),
        };
        (ctx, handle)
    }

    /// Attach a deadline to this context, keeping its cancel flag.
    pub fn with_deadline_at(&self, deadline: Instant) -> Self {
        Context {
            shared: self.shared.clone(),
            deadline: Some(deadline),
        }
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the context has been cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The context error, if the context is done. Cancellation takes
    /// precedence over an elapsed deadline.
    pub fn err(&self) -> Option<LadybugError> {
        if *self.shared.cancelled.lock().expect("context lock poisoned") {
            return Some(LadybugError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(LadybugError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Block for up to `timeout`, waking early if the context is
    /// cancelled. Used by the interrupt watcher between completion polls.
    pub(crate) fn wait_done_for(&self, timeout: Duration) {
        let cancelled = self.shared.cancelled.lock().expect("context lock poisoned");
        if *cancelled {
            return;
        }
        let _ = self
            .shared
            .cv
            .wait_timeout(cancelled, timeout)
            .expect("context lock poisoned");
    }

    /// Remaining time until the deadline in milliseconds, clamped to zero.
    /// `None` when no deadline is set.
    pub(crate) fn remaining_ms(&self) -> Option<u64> {
        self.deadline.map(|deadline| {
            deadline
                .saturating_duration_since(Instant::now())
                .as_millis() as u64
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert!(ctx.err().is_none());
        assert_eq!(ctx.remaining_ms(), None);
    }

    #[test]
    fn test_elapsed_deadline_is_deadline_exceeded() {
        let ctx = Context::with_timeout(Duration::ZERO);
        match ctx.err() {
            Some(LadybugError::DeadlineExceeded) => {}
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
        // Zero remaining, never negative.
        assert_eq!(ctx.remaining_ms(), Some(0));
    }

    #[test]
    fn test_cancel_wins_over_deadline() {
        let (ctx, cancel) = Context::cancellable();
        let ctx = ctx.with_deadline_at(Instant::now());
        cancel.cancel();
        match ctx.err() {
            Some(LadybugError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_clones_share_cancellation() {
        let (ctx, cancel) = Context::cancellable();
        let clone = ctx.clone();
        assert!(!clone.is_done());
        cancel.cancel();
        assert!(clone.is_done());
        assert!(ctx.is_done());
    }
}
