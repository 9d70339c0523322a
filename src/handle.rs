//! Ownership tracking for foreign engine handles.
//!
//! Every facade object in this crate owns exactly one [`OwnedHandle`]. The
//! handle is released exactly once: `close` takes the raw handle out under
//! a lock and dispatches the kind-appropriate destroy call, so a second
//! close (or the `Drop` backstop after an explicit close) is a no-op.
//! Every use goes through [`OwnedHandle::raw`], which fails fast with the
//! kind-appropriate closed error instead of forwarding a dead handle to
//! the engine.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::engine::{Engine, RawHandle};
use crate::error::{LadybugError, Result};

/// Which destroy call releases the handle, and which error surfaces when
/// it is used after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Database,
    Connection,
    Statement,
    Result,
    Tuple,
}

impl HandleKind {
    fn name(self) -> &'static str {
        match self {
            HandleKind::Database => "database",
            HandleKind::Connection => "connection",
            HandleKind::Statement => "prepared statement",
            HandleKind::Result => "result",
            HandleKind::Tuple => "row",
        }
    }
}

/// Sole owner of one foreign handle.
pub(crate) struct OwnedHandle {
    engine: Arc<dyn Engine>,
    kind: HandleKind,
    raw: Mutex<Option<RawHandle>>,
}

impl OwnedHandle {
    pub(crate) fn new(engine: Arc<dyn Engine>, kind: HandleKind, raw: RawHandle) -> Self {
        OwnedHandle {
            engine,
            kind,
            raw: Mutex::new(Some(raw)),
        }
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// The raw handle, or the kind-appropriate closed error.
    pub(crate) fn raw(&self) -> Result<RawHandle> {
        self.raw
            .lock()
            .expect("handle lock poisoned")
            .ok_or_else(|| self.closed_error())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.raw.lock().expect("handle lock poisoned").is_none()
    }

    /// Release the handle. Idempotent: only the first call reaches the
    /// engine.
    pub(crate) fn close(&self) {
        let taken = self.raw.lock().expect("handle lock poisoned").take();
        if let Some(raw) = taken {
            tracing::debug!(kind = self.kind.name(), id = raw.0, "releasing handle");
            match self.kind {
                HandleKind::Database => self.engine.database_destroy(raw),
                HandleKind::Connection => self.engine.connection_destroy(raw),
                HandleKind::Statement => self.engine.statement_destroy(raw),
                HandleKind::Result => self.engine.result_destroy(raw),
                HandleKind::Tuple => self.engine.tuple_destroy(raw),
            }
        }
    }

    fn closed_error(&self) -> LadybugError {
        match self.kind {
            HandleKind::Connection => LadybugError::InvalidConnection,
            kind => LadybugError::Closed(kind.name()),
        }
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("kind", &self.kind)
            .field("raw", &*self.raw.lock().expect("handle lock poisoned"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mem::MemoryEngine;

    fn tuple_handle(engine: &Arc<MemoryEngine>) -> OwnedHandle {
        let raw = engine.alloc_tuple(vec![]);
        OwnedHandle::new(engine.clone() as Arc<dyn Engine>, HandleKind::Tuple, raw)
    }

    #[test]
    fn test_close_is_idempotent() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = tuple_handle(&engine);
        assert!(!handle.is_closed());
        handle.close();
        assert!(handle.is_closed());
        // Second close must not reach the engine again.
        handle.close();
        assert!(handle.is_closed());
    }

    #[test]
    fn test_raw_after_close_fails_fast() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = tuple_handle(&engine);
        handle.close();
        match handle.raw() {
            Err(LadybugError::Closed(what)) => assert_eq!(what, "row"),
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_kind_maps_to_invalid_connection() {
        let engine = Arc::new(MemoryEngine::new());
        let raw = engine.alloc_tuple(vec![]);
        let handle = OwnedHandle::new(engine as Arc<dyn Engine>, HandleKind::Connection, raw);
        // Kind decides the error, not the underlying object.
        let _ = handle.raw().unwrap();
        // Close through the tuple destroy path would be wrong for a real
        // connection; for this test only the error mapping matters, so take
        // the raw handle out without destroying it.
        handle.raw.lock().unwrap().take();
        match handle.raw() {
            Err(LadybugError::InvalidConnection) => {}
            other => panic!("expected InvalidConnection, got {other:?}"),
        }
    }
}
