//! Prepared statements: compile once, bind, execute.

use std::sync::Weak;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::connection::ConnInner;
use crate::context::Context;
use crate::engine::status;
use crate::engine::{RawHandle, State};
use crate::error::{LadybugError, Result};
use crate::handle::OwnedHandle;
use crate::result::QueryResult;

/// A compiled statement bound to the connection that prepared it.
///
/// Binds are by parameter name. `execute` runs on the owning connection
/// and fails with `InvalidConnection` once that connection has been
/// dropped.
#[derive(Debug)]
pub struct PreparedStatement {
    handle: OwnedHandle,
    conn: Weak<ConnInner>,
    query: String,
}

impl PreparedStatement {
    pub(crate) fn new(handle: OwnedHandle, conn: Weak<ConnInner>, query: String) -> Self {
        PreparedStatement {
            handle,
            conn,
            query,
        }
    }

    /// The query text this statement was compiled from.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn bind_bool(&self, name: &str, v: bool) -> Result<()> {
        self.bind(name, "bind_bool", |stmt| {
            self.handle.engine().statement_bind_bool(stmt, name, v)
        })
    }

    pub fn bind_int64(&self, name: &str, v: i64) -> Result<()> {
        self.bind(name, "bind_int64", |stmt| {
            self.handle.engine().statement_bind_int64(stmt, name, v)
        })
    }

    pub fn bind_double(&self, name: &str, v: f64) -> Result<()> {
        self.bind(name, "bind_double", |stmt| {
            self.handle.engine().statement_bind_double(stmt, name, v)
        })
    }

    pub fn bind_string(&self, name: &str, v: &str) -> Result<()> {
        self.bind(name, "bind_string", |stmt| {
            self.handle.engine().statement_bind_string(stmt, name, v)
        })
    }

    /// Bind a calendar date; the time-of-day portion is discarded.
    pub fn bind_date(&self, name: &str, v: DateTime<Utc>) -> Result<()> {
        let epoch_days = v.timestamp().div_euclid(86_400) as i32;
        self.bind(name, "bind_date", |stmt| {
            self.handle
                .engine()
                .statement_bind_date(stmt, name, epoch_days)
        })
    }

    /// Bind an instant at nanosecond precision.
    pub fn bind_timestamp(&self, name: &str, v: DateTime<Utc>) -> Result<()> {
        let ns = v
            .timestamp_nanos_opt()
            .ok_or_else(|| LadybugError::InvalidArgument(format!("timestamp out of range: {v}")))?;
        self.bind(name, "bind_timestamp", |stmt| {
            self.handle
                .engine()
                .statement_bind_timestamp_ns(stmt, name, ns)
        })
    }

    /// Bind a duration, converted to difftime-style seconds.
    pub fn bind_interval(&self, name: &str, v: TimeDelta) -> Result<()> {
        let seconds = v.num_microseconds().map_or_else(
            || v.num_seconds() as f64,
            |micros| micros as f64 / 1e6,
        );
        self.bind(name, "bind_interval", |stmt| {
            self.handle
                .engine()
                .statement_bind_interval(stmt, name, seconds)
        })
    }

    /// Bind a UUID via its canonical string form.
    pub fn bind_uuid(&self, name: &str, v: Uuid) -> Result<()> {
        let text = v.to_string();
        self.bind(name, "bind_uuid", |stmt| {
            self.handle.engine().statement_bind_string(stmt, name, &text)
        })
    }

    /// Execute the statement with its current binds.
    pub fn execute(&self, ctx: &Context) -> Result<QueryResult> {
        let conn = self
            .conn
            .upgrade()
            .ok_or(LadybugError::InvalidConnection)?;
        let stmt = self.handle.raw()?;
        conn.run_query(ctx, "execute", &self.query, |engine, raw_conn, slot| {
            engine.connection_execute(raw_conn, stmt, slot)
        })
    }

    /// Release the statement handle. Idempotent.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    fn bind(
        &self,
        name: &str,
        op: &'static str,
        call: impl FnOnce(RawHandle) -> State,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(LadybugError::InvalidArgument(
                "parameter name is required".to_string(),
            ));
        }
        let stmt = self.handle.raw()?;
        status::check(op, call(stmt))
    }
}
