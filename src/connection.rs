//! Connections and the cancellation bridge.
//!
//! Every blocking call (`query`, `prepare`, `execute`) follows the same
//! guarded path: refuse closed connections, refuse already-done contexts,
//! translate a context deadline into the engine's millisecond query
//! timeout, then run the foreign call on the caller's thread while a
//! scoped watcher thread races the context against completion. When the
//! context wins, the watcher fires the connection's interrupt exactly
//! once and the call's eventual failure is reported as the context error.

use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::context::Context;
use crate::engine::status;
use crate::engine::{Engine, HandleSlot, RawHandle, State};
use crate::error::Result;
use crate::handle::{HandleKind, OwnedHandle};
use crate::prepared::PreparedStatement;
use crate::result::{QueryResult, QuerySummary};

/// How often the watcher re-checks the context between cancel wakeups.
const WATCH_INTERVAL: Duration = Duration::from_millis(10);

/// Shared connection state; prepared statements hold a weak reference so
/// they fail with `InvalidConnection` once the connection is gone.
#[derive(Debug)]
pub(crate) struct ConnInner {
    handle: OwnedHandle,
    // Keeps the database facade's handle alive while connections exist.
    _db: Arc<OwnedHandle>,
    config: Arc<Config>,
}

/// A single connection to an open database.
///
/// A connection runs one query at a time; `interrupt` and
/// `set_query_timeout` may be called from other threads.
#[derive(Debug)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl Connection {
    pub(crate) fn new(handle: OwnedHandle, db: Arc<OwnedHandle>, config: Arc<Config>) -> Self {
        Connection {
            inner: Arc::new(ConnInner {
                handle,
                _db: db,
                config,
            }),
        }
    }

    /// Run a query to completion and return its result.
    pub fn query(&self, ctx: &Context, query: &str) -> Result<QueryResult> {
        self.inner.run_query(ctx, "query", query, |engine, conn, slot| {
            engine.connection_query(conn, query, slot)
        })
    }

    /// Compile a parameterized statement for later execution.
    pub fn prepare(&self, ctx: &Context, query: &str) -> Result<PreparedStatement> {
        let raw = self
            .inner
            .guarded_call(ctx, "prepare", |engine, conn, slot| {
                engine.connection_prepare(conn, query, slot)
            })
            .map_err(|err| ctx.err().unwrap_or(err))?;

        let engine = self.inner.handle.engine().clone();
        let handle = OwnedHandle::new(engine.clone(), HandleKind::Statement, raw);
        status::statement_error(engine.as_ref(), "prepare", raw)
            .map_err(|err| ctx.err().unwrap_or(err))?;
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        Ok(PreparedStatement::new(
            handle,
            Arc::downgrade(&self.inner),
            query.to_string(),
        ))
    }

    /// Set the engine-side timeout applied to subsequent queries on this
    /// connection. A context deadline passed to `query`/`execute`
    /// overrides this for that call.
    pub fn set_query_timeout(&self, timeout: Duration) -> Result<()> {
        let conn = self.inner.handle.raw()?;
        let engine = self.inner.handle.engine();
        status::check(
            "connection_set_query_timeout",
            engine.connection_set_query_timeout(conn, timeout.as_millis() as u64),
        )
    }

    /// Best-effort request to abandon the query currently running on this
    /// connection.
    pub fn interrupt(&self) -> Result<()> {
        let conn = self.inner.handle.raw()?;
        self.inner.handle.engine().connection_interrupt(conn);
        Ok(())
    }

    /// Release the connection handle. Idempotent.
    pub fn close(&self) {
        self.inner.handle.close();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.handle.is_closed()
    }
}

impl ConnInner {
    /// Shared tail of `query` and `execute`: guarded call, query-level
    /// error check, post-call context check, then summary and completion
    /// hook. The hook fires exactly once per call, on every path.
    pub(crate) fn run_query(
        &self,
        ctx: &Context,
        op: &'static str,
        query: &str,
        call: impl FnOnce(&dyn Engine, RawHandle, &mut HandleSlot) -> State,
    ) -> Result<QueryResult> {
        match self.run_query_inner(ctx, op, call) {
            Ok(result) => {
                let summary = result.summary().unwrap_or_default();
                self.config.fire_query_finished(query, &summary, None);
                Ok(result)
            }
            Err(err) => {
                self.config
                    .fire_query_finished(query, &QuerySummary::default(), Some(&err));
                Err(err)
            }
        }
    }

    fn run_query_inner(
        &self,
        ctx: &Context,
        op: &'static str,
        call: impl FnOnce(&dyn Engine, RawHandle, &mut HandleSlot) -> State,
    ) -> Result<QueryResult> {
        let raw = self
            .guarded_call(ctx, op, call)
            .map_err(|err| ctx.err().unwrap_or(err))?;

        let engine = self.handle.engine().clone();
        let mut result = QueryResult::new(OwnedHandle::new(engine.clone(), HandleKind::Result, raw));

        // A failed *query* still yields a live result handle carrying the
        // error message; surface it and release the handle.
        if let Err(err) = status::result_error(engine.as_ref(), op, raw) {
            result.close();
            return Err(ctx.err().unwrap_or(err));
        }
        // The engine may also have finished normally in the window before
        // the interrupt landed. The context still wins.
        if let Some(err) = ctx.err() {
            result.close();
            return Err(err);
        }
        Ok(result)
    }

    /// Run one foreign call under context supervision and return the
    /// handle it produced.
    pub(crate) fn guarded_call(
        &self,
        ctx: &Context,
        op: &'static str,
        call: impl FnOnce(&dyn Engine, RawHandle, &mut HandleSlot) -> State,
    ) -> Result<RawHandle> {
        let conn = self.handle.raw()?;
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let engine = self.handle.engine();
        if let Some(timeout_ms) = ctx.remaining_ms() {
            status::check(
                "connection_set_query_timeout",
                engine.connection_set_query_timeout(conn, timeout_ms),
            )?;
        }

        let mut slot = HandleSlot::empty();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let state = thread::scope(|scope| {
            // Moved in so an unwinding call still disconnects the channel
            // and lets the watcher exit before the scope joins it.
            let done_tx = done_tx;
            scope.spawn(move || loop {
                if ctx.is_done() {
                    tracing::warn!(op, "context done, interrupting in-flight call");
                    engine.connection_interrupt(conn);
                    return;
                }
                match done_rx.try_recv() {
                    // Call finished (or its thread unwound); stand down.
                    Ok(()) | Err(TryRecvError::Disconnected) => return,
                    Err(TryRecvError::Empty) => {}
                }
                ctx.wait_done_for(WATCH_INTERVAL);
            });

            let state = call(engine.as_ref(), conn, &mut slot);
            let _ = done_tx.send(());
            state
        });

        status::check(op, state)?;
        slot.take().ok_or_else(|| status::missing_handle(op))
    }
}
