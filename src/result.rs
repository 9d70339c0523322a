//! Query results and row-at-a-time iteration.

use arrow::datatypes::SchemaRef;
use serde::Serialize;

use crate::engine::status;
use crate::engine::HandleSlot;
use crate::error::Result;
use crate::handle::{HandleKind, OwnedHandle};
use crate::row::Row;

/// Compile and execution timings for a finished query, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QuerySummary {
    pub compile_ms: f64,
    pub exec_ms: f64,
}

/// The result of a successful query.
///
/// Rows come back one at a time through [`next`](QueryResult::next); the
/// borrowed [`Row`] keeps the result mutably borrowed, so at most one row
/// is live at a time. Columnar export lives in the same object, see
/// [`schema`](QueryResult::schema) and
/// [`next_batch`](QueryResult::next_batch); mixing the two cursors over
/// one result is not supported.
#[derive(Debug)]
pub struct QueryResult {
    handle: OwnedHandle,
    pub(crate) schema: Option<SchemaRef>,
}

impl QueryResult {
    pub(crate) fn new(handle: OwnedHandle) -> Self {
        QueryResult {
            handle,
            schema: None,
        }
    }

    pub(crate) fn handle(&self) -> &OwnedHandle {
        &self.handle
    }

    /// Number of output columns.
    pub fn column_count(&self) -> Result<u64> {
        let raw = self.handle.raw()?;
        Ok(self.handle.engine().result_column_count(raw))
    }

    /// Output column names, in declaration order.
    pub fn column_names(&self) -> Result<Vec<String>> {
        let raw = self.handle.raw()?;
        let engine = self.handle.engine();
        let count = engine.result_column_count(raw);
        let mut names = Vec::with_capacity(count as usize);
        for index in 0..count {
            let mut name = String::new();
            status::check(
                "result_column_name",
                engine.result_column_name(raw, index, &mut name),
            )?;
            names.push(name);
        }
        Ok(names)
    }

    /// Total number of result rows, when the engine knows it.
    pub fn row_count(&self) -> Result<u64> {
        let raw = self.handle.raw()?;
        Ok(self.handle.engine().result_row_count(raw))
    }

    /// Compile/execution timings.
    pub fn summary(&self) -> Result<QuerySummary> {
        let raw = self.handle.raw()?;
        let mut summary = QuerySummary::default();
        status::check(
            "result_summary",
            self.handle
                .engine()
                .result_summary(raw, &mut summary.compile_ms, &mut summary.exec_ms),
        )?;
        Ok(summary)
    }

    /// Advance to the next row.
    ///
    /// Returns `None` at the end of the result (and after close). A
    /// mid-iteration engine failure also ends iteration; it is logged
    /// rather than surfaced, since the row fetch API has no error channel
    /// the engine distinguishes from exhaustion.
    pub fn next(&mut self) -> Option<Row<'_>> {
        let raw = self.handle.raw().ok()?;
        let engine = self.handle.engine().clone();
        if !engine.result_has_next(raw) {
            return None;
        }
        let mut slot = HandleSlot::empty();
        if !engine.result_next_row(raw, &mut slot).is_success() {
            tracing::debug!("row fetch failed, ending iteration");
            return None;
        }
        let tuple = slot.take()?;
        let columns = engine.result_column_count(raw);
        Some(Row::new(
            OwnedHandle::new(engine, HandleKind::Tuple, tuple),
            columns,
        ))
    }

    /// Release the result handle. Idempotent; also drops the cached Arrow
    /// schema.
    pub fn close(&mut self) {
        self.schema = None;
        self.handle.close();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}
