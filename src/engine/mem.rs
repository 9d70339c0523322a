//! Scriptable in-memory engine used by the test suite.
//!
//! [`MemoryEngine`] implements the full [`Engine`] contract over a handle
//! table guarded by one mutex. Queries are scripted by exact text: a
//! script can return rows, fail at the query level, hang until
//! interrupted, or delay before succeeding, which covers the cancellation
//! paths a native engine would exercise. Values round-trip through the
//! same dynamically-typed accessor surface the native engine exposes, so
//! the decoder is tested against the real call sequence.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use arrow::array::{Array, StructArray};
use arrow::ffi::{to_ffi, FFI_ArrowArray, FFI_ArrowSchema};
use arrow::record_batch::RecordBatch;

use super::{Engine, HandleSlot, LogicalTypeId, RawHandle, State, SystemConfig};
use crate::value::Value;

/// One stored cell. `Typed` and `Broken` exist so tests can pin an exact
/// logical type tag: `Typed` answers the matching raw extractor, `Broken`
/// fails every extractor and only renders as a string.
#[derive(Debug, Clone)]
enum Cell {
    Plain(Value),
    Typed { type_id: LogicalTypeId, raw: i64 },
    Broken { type_id: LogicalTypeId, display: String },
}

/// A scripted query outcome with rows.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResult {
    pub columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    pub compile_ms: f64,
    pub exec_ms: f64,
    /// Backing data for the Arrow export, if the script provides one.
    pub record: Option<RecordBatch>,
}

impl ScriptedResult {
    /// Rows of plain values under the given column names.
    pub fn from_values(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        ScriptedResult {
            columns: columns.iter().map(|name| name.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Cell::Plain).collect())
                .collect(),
            ..ScriptedResult::default()
        }
    }

    pub fn with_timings(mut self, compile_ms: f64, exec_ms: f64) -> Self {
        self.compile_ms = compile_ms;
        self.exec_ms = exec_ms;
        self
    }

    pub fn with_record(mut self, record: RecordBatch) -> Self {
        self.record = Some(record);
        self
    }
}

#[derive(Debug, Clone)]
enum Script {
    Rows(ScriptedResult),
    Fail(String),
    /// Block until interrupted or the connection's query timeout elapses.
    Hang,
    /// Sleep, then return rows regardless of interrupts.
    Delay { ms: u64, result: ScriptedResult },
}

#[derive(Debug)]
enum Obj {
    Db,
    Conn { timeout_ms: u64, interrupted: bool },
    Stmt { query: String, ok: bool, message: Option<String> },
    Res {
        script: ScriptedResult,
        ok: bool,
        message: Option<String>,
        cursor: usize,
        batch_cursor: usize,
    },
    Tuple(Vec<Cell>),
    Val(Cell),
}

#[derive(Debug, Default)]
struct EngineState {
    next_id: u64,
    objects: HashMap<u64, Obj>,
    scripts: HashMap<String, Script>,
    fail_next_alloc: bool,
    fail_open: bool,
}

/// See the module docs.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
    wake: Condvar,
}

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine::default()
    }

    // ---- scripting ----

    /// Answer `query` with rows.
    pub fn script(&self, query: &str, result: ScriptedResult) {
        self.lock().scripts.insert(query.to_string(), Script::Rows(result));
    }

    /// Answer `query` with a query-level failure carrying `message`.
    pub fn script_failure(&self, query: &str, message: &str) {
        self.lock()
            .scripts
            .insert(query.to_string(), Script::Fail(message.to_string()));
    }

    /// Make `query` block until interrupted (or until the connection's
    /// query timeout elapses).
    pub fn script_hang(&self, query: &str) {
        self.lock().scripts.insert(query.to_string(), Script::Hang);
    }

    /// Make `query` sleep `ms` milliseconds, then succeed with `result`
    /// even if an interrupt arrived meanwhile.
    pub fn script_delay(&self, query: &str, ms: u64, result: ScriptedResult) {
        self.lock()
            .scripts
            .insert(query.to_string(), Script::Delay { ms, result });
    }

    /// Fail the next handle-allocating call with [`State::AllocFailed`].
    pub fn fail_next_alloc(&self) {
        self.lock().fail_next_alloc = true;
    }

    /// Fail every subsequent `database_init`.
    pub fn fail_open(&self) {
        self.lock().fail_open = true;
    }

    // ---- direct allocation, for tests below the facade layer ----

    pub fn alloc_tuple(&self, cells: Vec<Value>) -> RawHandle {
        let mut state = self.lock();
        Self::insert(&mut state, Obj::Tuple(cells.into_iter().map(Cell::Plain).collect()))
    }

    pub fn alloc_value(&self, value: Value) -> RawHandle {
        let mut state = self.lock();
        Self::insert(&mut state, Obj::Val(Cell::Plain(value)))
    }

    /// A value with a pinned type tag whose only working extractor is the
    /// raw one matching that tag.
    pub fn alloc_typed(&self, type_id: LogicalTypeId, raw: i64) -> RawHandle {
        let mut state = self.lock();
        Self::insert(&mut state, Obj::Val(Cell::Typed { type_id, raw }))
    }

    /// A value whose every typed extractor fails; it only renders as
    /// `display`.
    pub fn alloc_broken(&self, type_id: LogicalTypeId, display: &str) -> RawHandle {
        let mut state = self.lock();
        Self::insert(
            &mut state,
            Obj::Val(Cell::Broken {
                type_id,
                display: display.to_string(),
            }),
        )
    }

    /// Number of live handles; lets tests assert nothing leaked.
    pub fn live_handles(&self) -> usize {
        self.lock().objects.len()
    }

    // ---- internals ----

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state poisoned")
    }

    fn insert(state: &mut EngineState, obj: Obj) -> RawHandle {
        state.next_id += 1;
        let id = state.next_id;
        state.objects.insert(id, obj);
        RawHandle(id)
    }

    fn take_alloc_failure(state: &mut EngineState) -> bool {
        std::mem::take(&mut state.fail_next_alloc)
    }

    fn destroy(&self, handle: RawHandle) {
        self.lock().objects.remove(&handle.0);
    }

    /// Run the script registered for `query` on `conn`, producing a result
    /// handle. Call-level failures (stale handles, allocation) surface in
    /// the returned state; query-level failures surface on the result.
    fn run_script(&self, conn: RawHandle, query: &str, out: &mut HandleSlot) -> State {
        let mut state = self.lock();
        if Self::take_alloc_failure(&mut state) {
            return State::AllocFailed;
        }
        let timeout_ms = match state.objects.get(&conn.0) {
            Some(Obj::Conn { timeout_ms, .. }) => *timeout_ms,
            _ => return State::Error,
        };
        let script = state.scripts.get(query).cloned();

        let res = match script {
            Some(Script::Rows(result)) => Obj::Res {
                script: result,
                ok: true,
                message: None,
                cursor: 0,
                batch_cursor: 0,
            },
            Some(Script::Fail(message)) => failed_res(message),
            Some(Script::Hang) => {
                let deadline = (timeout_ms > 0)
                    .then(|| Instant::now() + Duration::from_millis(timeout_ms));
                loop {
                    if let Some(Obj::Conn { interrupted, .. }) = state.objects.get_mut(&conn.0) {
                        if *interrupted {
                            *interrupted = false;
                            break failed_res("query interrupted".to_string());
                        }
                    } else {
                        return State::Error;
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        break failed_res("query timed out".to_string());
                    }
                    state = self
                        .wake
                        .wait_timeout(state, Duration::from_millis(2))
                        .expect("engine state poisoned")
                        .0;
                }
            }
            Some(Script::Delay { ms, result }) => {
                drop(state);
                std::thread::sleep(Duration::from_millis(ms));
                state = self.lock();
                Obj::Res {
                    script: result,
                    ok: true,
                    message: None,
                    cursor: 0,
                    batch_cursor: 0,
                }
            }
            None => failed_res(format!("no such query: {query}")),
        };

        out.fill(Self::insert(&mut state, res));
        State::Success
    }

    fn with_cell<T>(&self, value: RawHandle, f: impl FnOnce(&Cell) -> Option<T>) -> Option<T> {
        match self.lock().objects.get(&value.0) {
            Some(Obj::Val(cell)) => f(cell),
            _ => None,
        }
    }

    fn alloc_nested(&self, value: Value) -> RawHandle {
        let mut state = self.lock();
        Self::insert(&mut state, Obj::Val(Cell::Plain(value)))
    }
}

fn failed_res(message: String) -> Obj {
    Obj::Res {
        script: ScriptedResult::default(),
        ok: false,
        message: Some(message),
        cursor: 0,
        batch_cursor: 0,
    }
}

fn plain_type_id(value: &Value) -> LogicalTypeId {
    match value {
        // Null never reaches the tag dispatch; any tag will do.
        Value::Null => LogicalTypeId::String,
        Value::Bool(_) => LogicalTypeId::Bool,
        Value::Int64(_) => LogicalTypeId::Int64,
        Value::UInt64(_) => LogicalTypeId::UInt64,
        Value::Float64(_) => LogicalTypeId::Double,
        Value::Date(_) => LogicalTypeId::Date,
        Value::Timestamp(_) => LogicalTypeId::Timestamp,
        Value::Interval(_) => LogicalTypeId::Interval,
        Value::String(_) => LogicalTypeId::String,
        Value::Blob(_) => LogicalTypeId::Blob,
        Value::Uuid(_) => LogicalTypeId::Uuid,
        Value::List(_) => LogicalTypeId::List,
        Value::Struct(_) => LogicalTypeId::Struct,
        Value::Map(_) => LogicalTypeId::Map,
        Value::Node(_) => LogicalTypeId::Node,
        Value::Rel(_) => LogicalTypeId::Rel,
    }
}

macro_rules! fill_from_cell {
    ($self:ident, $value:ident, $out:ident, $($pattern:pat $(if $guard:expr)? => $extract:expr),+ $(,)?) => {
        match $self.with_cell($value, |cell| match cell {
            $($pattern $(if $guard)? => Some($extract),)+
            _ => None,
        }) {
            Some(v) => {
                *$out = v;
                State::Success
            }
            None => State::Error,
        }
    };
}

impl Engine for MemoryEngine {
    fn database_init(&self, _path: &str, _config: &SystemConfig, out: &mut HandleSlot) -> State {
        let mut state = self.lock();
        if Self::take_alloc_failure(&mut state) {
            return State::AllocFailed;
        }
        if state.fail_open {
            return State::Error;
        }
        out.fill(Self::insert(&mut state, Obj::Db));
        State::Success
    }

    fn database_destroy(&self, db: RawHandle) {
        self.destroy(db);
    }

    fn connection_init(&self, db: RawHandle, out: &mut HandleSlot) -> State {
        let mut state = self.lock();
        if Self::take_alloc_failure(&mut state) {
            return State::AllocFailed;
        }
        if !matches!(state.objects.get(&db.0), Some(Obj::Db)) {
            return State::Error;
        }
        out.fill(Self::insert(
            &mut state,
            Obj::Conn {
                timeout_ms: 0,
                interrupted: false,
            },
        ));
        State::Success
    }

    fn connection_destroy(&self, conn: RawHandle) {
        self.destroy(conn);
    }

    fn connection_query(&self, conn: RawHandle, query: &str, out: &mut HandleSlot) -> State {
        self.run_script(conn, query, out)
    }

    fn connection_prepare(&self, conn: RawHandle, query: &str, out: &mut HandleSlot) -> State {
        let mut state = self.lock();
        if Self::take_alloc_failure(&mut state) {
            return State::AllocFailed;
        }
        if !matches!(state.objects.get(&conn.0), Some(Obj::Conn { .. })) {
            return State::Error;
        }
        let stmt = match state.scripts.get(query) {
            Some(Script::Fail(message)) => Obj::Stmt {
                query: query.to_string(),
                ok: false,
                message: Some(message.clone()),
            },
            _ => Obj::Stmt {
                query: query.to_string(),
                ok: true,
                message: None,
            },
        };
        out.fill(Self::insert(&mut state, stmt));
        State::Success
    }

    fn connection_execute(&self, conn: RawHandle, stmt: RawHandle, out: &mut HandleSlot) -> State {
        let query = match self.lock().objects.get(&stmt.0) {
            Some(Obj::Stmt { query, .. }) => query.clone(),
            _ => return State::Error,
        };
        self.run_script(conn, &query, out)
    }

    fn connection_set_query_timeout(&self, conn: RawHandle, new_timeout_ms: u64) -> State {
        match self.lock().objects.get_mut(&conn.0) {
            Some(Obj::Conn { timeout_ms, .. }) => {
                *timeout_ms = new_timeout_ms;
                State::Success
            }
            _ => State::Error,
        }
    }

    fn connection_interrupt(&self, conn: RawHandle) {
        if let Some(Obj::Conn { interrupted, .. }) = self.lock().objects.get_mut(&conn.0) {
            *interrupted = true;
        }
        self.wake.notify_all();
    }

    fn statement_destroy(&self, stmt: RawHandle) {
        self.destroy(stmt);
    }

    fn statement_is_success(&self, stmt: RawHandle) -> bool {
        matches!(self.lock().objects.get(&stmt.0), Some(Obj::Stmt { ok: true, .. }))
    }

    fn statement_error_message(&self, stmt: RawHandle) -> Option<String> {
        match self.lock().objects.get(&stmt.0) {
            Some(Obj::Stmt { message, .. }) => message.clone(),
            _ => None,
        }
    }

    fn statement_bind_bool(&self, stmt: RawHandle, name: &str, _v: bool) -> State {
        self.bind_ok(stmt, name)
    }

    fn statement_bind_int64(&self, stmt: RawHandle, name: &str, _v: i64) -> State {
        self.bind_ok(stmt, name)
    }

    fn statement_bind_double(&self, stmt: RawHandle, name: &str, _v: f64) -> State {
        self.bind_ok(stmt, name)
    }

    fn statement_bind_string(&self, stmt: RawHandle, name: &str, _v: &str) -> State {
        self.bind_ok(stmt, name)
    }

    fn statement_bind_date(&self, stmt: RawHandle, name: &str, _epoch_days: i32) -> State {
        self.bind_ok(stmt, name)
    }

    fn statement_bind_timestamp_ns(&self, stmt: RawHandle, name: &str, _ns: i64) -> State {
        self.bind_ok(stmt, name)
    }

    fn statement_bind_interval(&self, stmt: RawHandle, name: &str, _seconds: f64) -> State {
        self.bind_ok(stmt, name)
    }

    fn result_destroy(&self, result: RawHandle) {
        self.destroy(result);
    }

    fn result_is_success(&self, result: RawHandle) -> bool {
        matches!(self.lock().objects.get(&result.0), Some(Obj::Res { ok: true, .. }))
    }

    fn result_error_message(&self, result: RawHandle) -> Option<String> {
        match self.lock().objects.get(&result.0) {
            Some(Obj::Res { message, .. }) => message.clone(),
            _ => None,
        }
    }

    fn result_column_count(&self, result: RawHandle) -> u64 {
        match self.lock().objects.get(&result.0) {
            Some(Obj::Res { script, .. }) => script.columns.len() as u64,
            _ => 0,
        }
    }

    fn result_column_name(&self, result: RawHandle, index: u64, out: &mut String) -> State {
        match self.lock().objects.get(&result.0) {
            Some(Obj::Res { script, .. }) => match script.columns.get(index as usize) {
                Some(name) => {
                    *out = name.clone();
                    State::Success
                }
                None => State::Error,
            },
            _ => State::Error,
        }
    }

    fn result_row_count(&self, result: RawHandle) -> u64 {
        match self.lock().objects.get(&result.0) {
            Some(Obj::Res { script, .. }) => script.rows.len() as u64,
            _ => 0,
        }
    }

    fn result_has_next(&self, result: RawHandle) -> bool {
        match self.lock().objects.get(&result.0) {
            Some(Obj::Res { script, cursor, .. }) => *cursor < script.rows.len(),
            _ => false,
        }
    }

    fn result_next_row(&self, result: RawHandle, out: &mut HandleSlot) -> State {
        let mut state = self.lock();
        let row = match state.objects.get_mut(&result.0) {
            Some(Obj::Res { script, cursor, .. }) if *cursor < script.rows.len() => {
                let row = script.rows[*cursor].clone();
                *cursor += 1;
                row
            }
            _ => return State::Error,
        };
        out.fill(Self::insert(&mut state, Obj::Tuple(row)));
        State::Success
    }

    fn result_summary(&self, result: RawHandle, compile_ms: &mut f64, exec_ms: &mut f64) -> State {
        match self.lock().objects.get(&result.0) {
            Some(Obj::Res { script, .. }) => {
                *compile_ms = script.compile_ms;
                *exec_ms = script.exec_ms;
                State::Success
            }
            _ => State::Error,
        }
    }

    fn result_arrow_schema(&self, result: RawHandle, out: &mut FFI_ArrowSchema) -> State {
        let record = match self.lock().objects.get(&result.0) {
            Some(Obj::Res { script, .. }) => script.record.clone(),
            _ => None,
        };
        let Some(record) = record else {
            return State::Error;
        };
        match FFI_ArrowSchema::try_from(record.schema().as_ref()) {
            Ok(schema) => {
                *out = schema;
                State::Success
            }
            Err(_) => State::Error,
        }
    }

    fn result_arrow_chunk(
        &self,
        result: RawHandle,
        chunk_size: i64,
        out: &mut FFI_ArrowArray,
        rows: &mut i64,
    ) -> State {
        let (chunk, take) = {
            let mut state = self.lock();
            match state.objects.get_mut(&result.0) {
                Some(Obj::Res { script, batch_cursor, .. }) => {
                    let Some(record) = script.record.clone() else {
                        return State::Error;
                    };
                    let remaining = record.num_rows().saturating_sub(*batch_cursor);
                    let take = remaining.min(chunk_size.max(0) as usize);
                    if take == 0 {
                        *rows = 0;
                        return State::Success;
                    }
                    let offset = *batch_cursor;
                    *batch_cursor += take;
                    (record.slice(offset, take), take)
                }
                _ => return State::Error,
            }
        };
        let data = StructArray::from(chunk).into_data();
        match to_ffi(&data) {
            Ok((array, _schema)) => {
                *out = array;
                *rows = take as i64;
                State::Success
            }
            Err(_) => State::Error,
        }
    }

    fn tuple_destroy(&self, tuple: RawHandle) {
        self.destroy(tuple);
    }

    fn tuple_value(&self, tuple: RawHandle, index: u64, out: &mut HandleSlot) -> State {
        let mut state = self.lock();
        let cell = match state.objects.get(&tuple.0) {
            Some(Obj::Tuple(cells)) => match cells.get(index as usize) {
                Some(cell) => cell.clone(),
                None => return State::Error,
            },
            _ => return State::Error,
        };
        out.fill(Self::insert(&mut state, Obj::Val(cell)));
        State::Success
    }

    fn value_destroy(&self, value: RawHandle) {
        self.destroy(value);
    }

    fn value_is_null(&self, value: RawHandle) -> bool {
        self.with_cell(value, |cell| match cell {
            Cell::Plain(Value::Null) => Some(true),
            _ => Some(false),
        })
        .unwrap_or(false)
    }

    fn value_type_id(&self, value: RawHandle) -> LogicalTypeId {
        self.with_cell(value, |cell| {
            Some(match cell {
                Cell::Plain(value) => plain_type_id(value),
                Cell::Typed { type_id, .. } | Cell::Broken { type_id, .. } => *type_id,
            })
        })
        .unwrap_or(LogicalTypeId::String)
    }

    fn value_to_string(&self, value: RawHandle) -> String {
        self.with_cell(value, |cell| {
            Some(match cell {
                Cell::Plain(value) => value.to_string(),
                Cell::Typed { raw, .. } => raw.to_string(),
                Cell::Broken { display, .. } => display.clone(),
            })
        })
        .unwrap_or_default()
    }

    fn value_bool(&self, value: RawHandle, out: &mut bool) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Bool(b)) => *b)
    }

    fn value_int64(&self, value: RawHandle, out: &mut i64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::Int64(i)) => *i,
            Cell::Typed {
                type_id:
                    LogicalTypeId::Int8
                    | LogicalTypeId::Int16
                    | LogicalTypeId::Int32
                    | LogicalTypeId::Int64
                    | LogicalTypeId::Serial,
                raw,
            } => *raw,
        )
    }

    fn value_uint64(&self, value: RawHandle, out: &mut u64) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::UInt64(u)) => *u)
    }

    fn value_float(&self, value: RawHandle, out: &mut f32) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Float64(f)) => *f as f32)
    }

    fn value_double(&self, value: RawHandle, out: &mut f64) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Float64(f)) => *f)
    }

    fn value_date_days(&self, value: RawHandle, out: &mut i32) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::Date(t)) => t.timestamp().div_euclid(86_400) as i32,
            Cell::Typed { type_id: LogicalTypeId::Date, raw } => *raw as i32,
        )
    }

    fn value_timestamp_micros(&self, value: RawHandle, out: &mut i64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::Timestamp(t)) => t.timestamp_micros(),
            Cell::Typed { type_id: LogicalTypeId::Timestamp, raw } => *raw,
        )
    }

    fn value_timestamp_ns(&self, value: RawHandle, out: &mut i64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Typed { type_id: LogicalTypeId::TimestampNs, raw } => *raw,
        )
    }

    fn value_timestamp_ms(&self, value: RawHandle, out: &mut i64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Typed { type_id: LogicalTypeId::TimestampMs, raw } => *raw,
        )
    }

    fn value_timestamp_secs(&self, value: RawHandle, out: &mut i64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Typed { type_id: LogicalTypeId::TimestampSec, raw } => *raw,
        )
    }

    fn value_timestamp_tz_micros(&self, value: RawHandle, out: &mut i64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Typed { type_id: LogicalTypeId::TimestampTz, raw } => *raw,
        )
    }

    fn value_interval_seconds(&self, value: RawHandle, out: &mut f64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::Interval(d)) => {
                d.num_microseconds().map_or_else(
                    || d.num_seconds() as f64,
                    |micros| micros as f64 / 1e6,
                )
            },
        )
    }

    fn value_string(&self, value: RawHandle, out: &mut String) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::String(s)) => s.clone())
    }

    fn value_blob(&self, value: RawHandle, out: &mut Vec<u8>) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Blob(b)) => b.clone())
    }

    fn value_uuid(&self, value: RawHandle, out: &mut String) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Uuid(u)) => u.to_string())
    }

    fn value_list_size(&self, value: RawHandle, out: &mut u64) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::List(items)) => items.len() as u64,
            // A typed list cell reports a size but fails element access,
            // for testing mid-container failures.
            Cell::Typed { type_id: LogicalTypeId::List, raw } => *raw as u64,
        )
    }

    fn value_list_element(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State {
        let item = self.with_cell(value, |cell| match cell {
            Cell::Plain(Value::List(items)) => items.get(index as usize).cloned(),
            _ => None,
        });
        match item {
            Some(item) => {
                out.fill(self.alloc_nested(item));
                State::Success
            }
            None => State::Error,
        }
    }

    fn value_struct_field_count(&self, value: RawHandle, out: &mut u64) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Struct(fields)) => fields.len() as u64)
    }

    fn value_struct_field_name(&self, value: RawHandle, index: u64, out: &mut String) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::Struct(fields)) if index < fields.len() as u64 =>
                fields[index as usize].0.clone(),
        )
    }

    fn value_struct_field_value(
        &self,
        value: RawHandle,
        index: u64,
        out: &mut HandleSlot,
    ) -> State {
        let field = self.with_cell(value, |cell| match cell {
            Cell::Plain(Value::Struct(fields)) => {
                fields.get(index as usize).map(|(_, value)| value.clone())
            }
            _ => None,
        });
        match field {
            Some(field) => {
                out.fill(self.alloc_nested(field));
                State::Success
            }
            None => State::Error,
        }
    }

    fn value_map_size(&self, value: RawHandle, out: &mut u64) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Map(entries)) => entries.len() as u64)
    }

    fn value_map_key(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State {
        let key = self.with_cell(value, |cell| match cell {
            Cell::Plain(Value::Map(entries)) => entries
                .get(index as usize)
                .map(|(key, _)| Value::String(key.clone())),
            _ => None,
        });
        match key {
            Some(key) => {
                out.fill(self.alloc_nested(key));
                State::Success
            }
            None => State::Error,
        }
    }

    fn value_map_value(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State {
        let entry = self.with_cell(value, |cell| match cell {
            Cell::Plain(Value::Map(entries)) => {
                entries.get(index as usize).map(|(_, value)| value.clone())
            }
            _ => None,
        });
        match entry {
            Some(entry) => {
                out.fill(self.alloc_nested(entry));
                State::Success
            }
            None => State::Error,
        }
    }

    fn node_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State {
        self.node_part(value, out, |node| Some(node.id.clone()))
    }

    fn node_label_value(&self, value: RawHandle, out: &mut HandleSlot) -> State {
        // Single-label nodes export a plain string, multi-label nodes a
        // list, matching the native engine's two shapes.
        self.node_part(value, out, |node| {
            Some(if node.labels.len() == 1 {
                Value::String(node.labels[0].clone())
            } else {
                Value::List(
                    node.labels
                        .iter()
                        .map(|label| Value::String(label.clone()))
                        .collect(),
                )
            })
        })
    }

    fn node_property_count(&self, value: RawHandle, out: &mut u64) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Node(n)) => n.properties.len() as u64)
    }

    fn node_property_name(&self, value: RawHandle, index: u64, out: &mut String) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::Node(n)) if index < n.properties.len() as u64 =>
                n.properties[index as usize].0.clone(),
        )
    }

    fn node_property_value(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State {
        self.node_part(value, out, |node| {
            node.properties
                .get(index as usize)
                .map(|(_, value)| value.clone())
        })
    }

    fn rel_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State {
        self.rel_part(value, out, |rel| Some(rel.id.clone()))
    }

    fn rel_src_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State {
        self.rel_part(value, out, |rel| Some(rel.src_id.clone()))
    }

    fn rel_dst_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State {
        self.rel_part(value, out, |rel| Some(rel.dst_id.clone()))
    }

    fn rel_label_value(&self, value: RawHandle, out: &mut HandleSlot) -> State {
        self.rel_part(value, out, |rel| Some(Value::String(rel.label.clone())))
    }

    fn rel_property_count(&self, value: RawHandle, out: &mut u64) -> State {
        fill_from_cell!(self, value, out, Cell::Plain(Value::Rel(r)) => r.properties.len() as u64)
    }

    fn rel_property_name(&self, value: RawHandle, index: u64, out: &mut String) -> State {
        fill_from_cell!(self, value, out,
            Cell::Plain(Value::Rel(r)) if index < r.properties.len() as u64 =>
                r.properties[index as usize].0.clone(),
        )
    }

    fn rel_property_value(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State {
        self.rel_part(value, out, |rel| {
            rel.properties
                .get(index as usize)
                .map(|(_, value)| value.clone())
        })
    }

    fn version(&self) -> String {
        "0.11.0-mem".to_string()
    }

    fn storage_version(&self) -> u64 {
        36
    }
}

impl MemoryEngine {
    fn bind_ok(&self, stmt: RawHandle, name: &str) -> State {
        if name.is_empty() {
            return State::Error;
        }
        match self.lock().objects.get(&stmt.0) {
            Some(Obj::Stmt { .. }) => State::Success,
            _ => State::Error,
        }
    }

    fn node_part(
        &self,
        value: RawHandle,
        out: &mut HandleSlot,
        f: impl FnOnce(&crate::value::Node) -> Option<Value>,
    ) -> State {
        let part = self.with_cell(value, |cell| match cell {
            Cell::Plain(Value::Node(node)) => f(node),
            _ => None,
        });
        match part {
            Some(part) => {
                out.fill(self.alloc_nested(part));
                State::Success
            }
            None => State::Error,
        }
    }

    fn rel_part(
        &self,
        value: RawHandle,
        out: &mut HandleSlot,
        f: impl FnOnce(&crate::value::Rel) -> Option<Value>,
    ) -> State {
        let part = self.with_cell(value, |cell| match cell {
            Cell::Plain(Value::Rel(rel)) => f(rel),
            _ => None,
        });
        match part {
            Some(part) => {
                out.fill(self.alloc_nested(part));
                State::Success
            }
            None => State::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::value::{Node, Rel};
    use chrono::DateTime;

    fn decode_one(engine: &MemoryEngine, value: Value) -> Value {
        let handle = engine.alloc_value(value);
        let decoded = decode(engine, handle).unwrap();
        engine.value_destroy(handle);
        decoded
    }

    #[test]
    fn test_scalars_round_trip() {
        let engine = MemoryEngine::new();
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Int64(-3),
            Value::UInt64(u64::MAX),
            Value::Float64(2.5),
            Value::String("hello".to_string()),
            Value::Blob(vec![0, 255]),
            Value::Uuid(uuid::Uuid::nil()),
        ] {
            assert_eq!(decode_one(&engine, value.clone()), value);
        }
        assert_eq!(engine.live_handles(), 0, "decode leaked value handles");
    }

    #[test]
    fn test_nested_containers_round_trip() {
        let engine = MemoryEngine::new();
        let value = Value::Struct(vec![
            (
                "items".to_string(),
                Value::List(vec![Value::Int64(1), Value::Null]),
            ),
            (
                "meta".to_string(),
                Value::Map(vec![("k".to_string(), Value::Bool(false))]),
            ),
        ]);
        assert_eq!(decode_one(&engine, value.clone()), value);
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn test_node_and_rel_round_trip() {
        let engine = MemoryEngine::new();
        let node = Value::Node(Box::new(Node {
            id: Value::Int64(7),
            labels: vec!["Person".to_string()],
            properties: vec![("name".to_string(), Value::String("Ann".to_string()))],
        }));
        assert_eq!(decode_one(&engine, node.clone()), node);

        // Multiple labels export as a list; decoding coerces back.
        let multi = Value::Node(Box::new(Node {
            id: Value::Int64(8),
            labels: vec!["A".to_string(), "B".to_string()],
            properties: vec![],
        }));
        assert_eq!(decode_one(&engine, multi.clone()), multi);

        let rel = Value::Rel(Box::new(Rel {
            id: Value::Int64(3),
            src_id: Value::Int64(1),
            dst_id: Value::Int64(2),
            label: "KNOWS".to_string(),
            properties: vec![],
        }));
        assert_eq!(decode_one(&engine, rel.clone()), rel);
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn test_timestamp_variants_normalize_to_one_instant() {
        let engine = MemoryEngine::new();
        let expected = Value::Timestamp(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        for (type_id, raw) in [
            (LogicalTypeId::Timestamp, 1_700_000_000_000_000i64),
            (LogicalTypeId::TimestampTz, 1_700_000_000_000_000),
            (LogicalTypeId::TimestampNs, 1_700_000_000_000_000_000),
            (LogicalTypeId::TimestampMs, 1_700_000_000_000),
            (LogicalTypeId::TimestampSec, 1_700_000_000),
        ] {
            let handle = engine.alloc_typed(type_id, raw);
            assert_eq!(decode(&engine, handle).unwrap(), expected, "{type_id:?}");
            engine.value_destroy(handle);
        }
    }

    #[test]
    fn test_date_decodes_to_midnight_utc() {
        let engine = MemoryEngine::new();
        let handle = engine.alloc_typed(LogicalTypeId::Date, 19_723);
        match decode(&engine, handle).unwrap() {
            Value::Date(t) => assert_eq!(t.to_rfc3339(), "2024-01-01T00:00:00+00:00"),
            other => panic!("expected date, got {other:?}"),
        }
        engine.value_destroy(handle);
    }

    #[test]
    fn test_broken_value_falls_back_to_string() {
        let engine = MemoryEngine::new();
        // A failing extractor degrades to the engine's rendering.
        let handle = engine.alloc_broken(LogicalTypeId::Int64, "42?");
        assert_eq!(
            decode(&engine, handle).unwrap(),
            Value::String("42?".to_string())
        );
        engine.value_destroy(handle);

        // Unhandled tags take the same path.
        let handle = engine.alloc_broken(LogicalTypeId::Decimal, "1.23");
        assert_eq!(
            decode(&engine, handle).unwrap(),
            Value::String("1.23".to_string())
        );
        engine.value_destroy(handle);
    }

    #[test]
    fn test_container_element_failure_aborts_decode() {
        let engine = MemoryEngine::new();
        // Claims three elements but fails to produce any of them, so the
        // container decode must error instead of degrading.
        let handle = engine.alloc_typed(LogicalTypeId::List, 3);
        match decode(&engine, handle) {
            Err(crate::error::LadybugError::Engine { op, .. }) => {
                assert_eq!(op, "value_list_element");
            }
            other => panic!("expected Engine error, got {other:?}"),
        }
        engine.value_destroy(handle);
    }

    #[test]
    fn test_interval_round_trips_through_seconds() {
        let engine = MemoryEngine::new();
        let value = Value::Interval(chrono::TimeDelta::milliseconds(1_500));
        assert_eq!(decode_one(&engine, value.clone()), value);
    }
}
