//! Abstract contract for the foreign Ladybug engine.
//!
//! The driver never talks to the engine directly; it goes through the
//! [`Engine`] trait, which mirrors the engine's C ABI one call per method:
//! `init`/`destroy` pairs that fill a pre-allocated [`HandleSlot`] and
//! return a [`State`], a dynamically-typed value accessor API keyed by
//! [`LogicalTypeId`], an Arrow C-data columnar export, and per-connection
//! timeout/interrupt control. A native build links the real engine behind
//! this trait; the [`mem`] module provides the in-memory engine used by the
//! test suite.

pub mod mem;
pub(crate) mod status;

use arrow::ffi::{FFI_ArrowArray, FFI_ArrowSchema};

/// Status code returned by engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum State {
    /// The call succeeded; any output slot has been filled.
    Success = 0,
    /// The call failed; output slots are untouched.
    Error = 1,
    /// The engine could not allocate the backing memory for a handle.
    AllocFailed = 2,
}

impl State {
    /// True when the call succeeded.
    pub fn is_success(self) -> bool {
        self == State::Success
    }
}

/// Opaque reference to an engine-owned object.
///
/// A raw handle carries no ownership; exactly one wrapper object in this
/// crate owns each handle and releases it through the matching `destroy`
/// call. Handles must never be used after destroy; the engine is expected
/// to detect stale handles and fail the call rather than crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u64);

/// Pre-allocated output slot for `init`-style calls.
///
/// The caller allocates the slot, passes it in, and takes the handle out
/// on success. A failed call leaves the slot empty.
#[derive(Debug, Default)]
pub struct HandleSlot(Option<RawHandle>);

impl HandleSlot {
    /// A fresh, empty slot.
    pub fn empty() -> Self {
        HandleSlot(None)
    }

    /// Fill the slot (engine side).
    pub fn fill(&mut self, handle: RawHandle) {
        self.0 = Some(handle);
    }

    /// Take the handle out of the slot, leaving it empty.
    pub fn take(&mut self) -> Option<RawHandle> {
        self.0.take()
    }
}

/// Engine-level options passed to `database_init`.
///
/// Zero values mean "engine default".
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    /// Open the database in read-only mode.
    pub read_only: bool,
    /// Buffer pool size in bytes (0 = engine default).
    pub buffer_pool_size: u64,
    /// Maximum threads for query execution (0 = engine default).
    pub max_num_threads: u64,
}

/// Logical type tag of a dynamically-typed engine value.
///
/// This is a closed enumeration today, but the engine may grow new tags;
/// the decoder treats anything it does not handle via the string fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalTypeId {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Serial,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Date,
    /// Microseconds since the Unix epoch.
    Timestamp,
    TimestampNs,
    TimestampMs,
    TimestampSec,
    /// Microseconds since the Unix epoch, stored with a zone; treated as UTC.
    TimestampTz,
    Interval,
    String,
    Blob,
    Uuid,
    List,
    Array,
    Struct,
    Map,
    Union,
    Node,
    Rel,
    RecursiveRel,
    /// Internal row identity; only reachable nested inside Node/Rel ids.
    InternalId,
    /// Fixed-point decimal; decoded via the string fallback.
    Decimal,
}

/// The foreign engine surface consumed by this driver.
///
/// All methods take `&self`: the engine is expected to be internally
/// synchronized and safe for concurrent use across connections (result and
/// row iteration remain single-consumer, which the facades enforce by
/// ownership). Implementations must tolerate stale handles by returning
/// [`State::Error`] instead of crashing.
pub trait Engine: Send + Sync {
    // ---- lifecycle ----

    /// Open or create a database at `path`. Fills `out` on success.
    fn database_init(&self, path: &str, config: &SystemConfig, out: &mut HandleSlot) -> State;
    fn database_destroy(&self, db: RawHandle);

    /// Create a connection to an open database.
    fn connection_init(&self, db: RawHandle, out: &mut HandleSlot) -> State;
    fn connection_destroy(&self, conn: RawHandle);

    /// Run a query, filling `out` with a result handle. A failed *query*
    /// (as opposed to a failed call) still produces a result handle whose
    /// success predicate is false.
    fn connection_query(&self, conn: RawHandle, query: &str, out: &mut HandleSlot) -> State;
    /// Compile a statement, filling `out` with a prepared-statement handle.
    fn connection_prepare(&self, conn: RawHandle, query: &str, out: &mut HandleSlot) -> State;
    /// Execute a prepared statement on the connection it was prepared on.
    fn connection_execute(&self, conn: RawHandle, stmt: RawHandle, out: &mut HandleSlot) -> State;

    /// Set the query timeout in milliseconds (0 = no timeout).
    fn connection_set_query_timeout(&self, conn: RawHandle, timeout_ms: u64) -> State;
    /// Best-effort request to abandon the in-flight query on `conn`.
    fn connection_interrupt(&self, conn: RawHandle);

    // ---- prepared statements ----

    fn statement_destroy(&self, stmt: RawHandle);
    /// Whether compilation succeeded.
    fn statement_is_success(&self, stmt: RawHandle) -> bool;
    /// Compilation error message, if any.
    fn statement_error_message(&self, stmt: RawHandle) -> Option<String>;

    fn statement_bind_bool(&self, stmt: RawHandle, name: &str, v: bool) -> State;
    fn statement_bind_int64(&self, stmt: RawHandle, name: &str, v: i64) -> State;
    fn statement_bind_double(&self, stmt: RawHandle, name: &str, v: f64) -> State;
    fn statement_bind_string(&self, stmt: RawHandle, name: &str, v: &str) -> State;
    /// Bind a date as days since the Unix epoch.
    fn statement_bind_date(&self, stmt: RawHandle, name: &str, epoch_days: i32) -> State;
    /// Bind a timestamp as nanoseconds since the Unix epoch.
    fn statement_bind_timestamp_ns(&self, stmt: RawHandle, name: &str, ns: i64) -> State;
    /// Bind an interval as difftime-style seconds.
    fn statement_bind_interval(&self, stmt: RawHandle, name: &str, seconds: f64) -> State;

    // ---- results ----

    fn result_destroy(&self, result: RawHandle);
    /// Whether the query itself succeeded.
    fn result_is_success(&self, result: RawHandle) -> bool;
    /// Query error message, if any.
    fn result_error_message(&self, result: RawHandle) -> Option<String>;

    fn result_column_count(&self, result: RawHandle) -> u64;
    fn result_column_name(&self, result: RawHandle, index: u64, out: &mut String) -> State;
    /// Number of result rows (0 if unknown).
    fn result_row_count(&self, result: RawHandle) -> u64;
    fn result_has_next(&self, result: RawHandle) -> bool;
    /// Fetch the next row, filling `out` with a flat-tuple handle.
    fn result_next_row(&self, result: RawHandle, out: &mut HandleSlot) -> State;
    /// Compile/execution time in milliseconds.
    fn result_summary(&self, result: RawHandle, compile_ms: &mut f64, exec_ms: &mut f64) -> State;

    // ---- columnar export (Arrow C data interface) ----

    /// Export the result schema into the caller-allocated struct. On
    /// success the struct's release callback is live and owned by the
    /// caller (dropping the struct releases the engine-side metadata).
    fn result_arrow_schema(&self, result: RawHandle, out: &mut FFI_ArrowSchema) -> State;
    /// Export the next chunk of up to `chunk_size` rows. `rows` receives
    /// the chunk's row count; 0 rows with [`State::Success`] signals
    /// exhaustion and leaves `out` untouched. On success the array's
    /// buffers are owned by the caller through the struct's release
    /// callback.
    fn result_arrow_chunk(
        &self,
        result: RawHandle,
        chunk_size: i64,
        out: &mut FFI_ArrowArray,
        rows: &mut i64,
    ) -> State;

    // ---- rows (flat tuples) ----

    fn tuple_destroy(&self, tuple: RawHandle);
    /// Fill `out` with a value handle for column `index`.
    fn tuple_value(&self, tuple: RawHandle, index: u64, out: &mut HandleSlot) -> State;

    // ---- values ----

    fn value_destroy(&self, value: RawHandle);
    fn value_is_null(&self, value: RawHandle) -> bool;
    fn value_type_id(&self, value: RawHandle) -> LogicalTypeId;
    /// Engine-rendered string representation; infallible.
    fn value_to_string(&self, value: RawHandle) -> String;

    fn value_bool(&self, value: RawHandle, out: &mut bool) -> State;
    fn value_int64(&self, value: RawHandle, out: &mut i64) -> State;
    fn value_uint64(&self, value: RawHandle, out: &mut u64) -> State;
    fn value_float(&self, value: RawHandle, out: &mut f32) -> State;
    fn value_double(&self, value: RawHandle, out: &mut f64) -> State;
    /// Days since the Unix epoch.
    fn value_date_days(&self, value: RawHandle, out: &mut i32) -> State;
    fn value_timestamp_micros(&self, value: RawHandle, out: &mut i64) -> State;
    fn value_timestamp_ns(&self, value: RawHandle, out: &mut i64) -> State;
    fn value_timestamp_ms(&self, value: RawHandle, out: &mut i64) -> State;
    fn value_timestamp_secs(&self, value: RawHandle, out: &mut i64) -> State;
    fn value_timestamp_tz_micros(&self, value: RawHandle, out: &mut i64) -> State;
    /// Difftime-style conversion of the interval to seconds.
    fn value_interval_seconds(&self, value: RawHandle, out: &mut f64) -> State;
    fn value_string(&self, value: RawHandle, out: &mut String) -> State;
    fn value_blob(&self, value: RawHandle, out: &mut Vec<u8>) -> State;
    /// Canonical string form of the UUID.
    fn value_uuid(&self, value: RawHandle, out: &mut String) -> State;

    fn value_list_size(&self, value: RawHandle, out: &mut u64) -> State;
    fn value_list_element(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State;

    fn value_struct_field_count(&self, value: RawHandle, out: &mut u64) -> State;
    fn value_struct_field_name(&self, value: RawHandle, index: u64, out: &mut String) -> State;
    fn value_struct_field_value(&self, value: RawHandle, index: u64, out: &mut HandleSlot)
        -> State;

    fn value_map_size(&self, value: RawHandle, out: &mut u64) -> State;
    fn value_map_key(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State;
    fn value_map_value(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State;

    fn node_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State;
    fn node_label_value(&self, value: RawHandle, out: &mut HandleSlot) -> State;
    fn node_property_count(&self, value: RawHandle, out: &mut u64) -> State;
    fn node_property_name(&self, value: RawHandle, index: u64, out: &mut String) -> State;
    fn node_property_value(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State;

    fn rel_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State;
    fn rel_src_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State;
    fn rel_dst_id_value(&self, value: RawHandle, out: &mut HandleSlot) -> State;
    fn rel_label_value(&self, value: RawHandle, out: &mut HandleSlot) -> State;
    fn rel_property_count(&self, value: RawHandle, out: &mut u64) -> State;
    fn rel_property_name(&self, value: RawHandle, index: u64, out: &mut String) -> State;
    fn rel_property_value(&self, value: RawHandle, index: u64, out: &mut HandleSlot) -> State;

    // ---- versions ----

    /// Engine version string.
    fn version(&self) -> String;
    /// On-disk storage format version.
    fn storage_version(&self) -> u64;
}
