//! Zero-copy columnar export over the Arrow C data interface.
//!
//! The engine exports the result schema and successive record chunks into
//! caller-allocated C-data structs; `arrow`'s FFI layer then takes
//! ownership of the buffers through the structs' release callbacks, so
//! chunk data crosses the boundary without a copy. On any import failure
//! the dropped struct still runs its release callback, so engine-side
//! buffers never leak.

use std::sync::Arc;

use arrow::array::StructArray;
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::ffi::{from_ffi_and_data_type, FFI_ArrowArray, FFI_ArrowSchema};
use arrow::record_batch::RecordBatch;

use crate::engine::status;
use crate::error::Result;
use crate::result::QueryResult;

impl QueryResult {
    /// Default rows per chunk for [`next_batch`](QueryResult::next_batch).
    pub const DEFAULT_CHUNK_SIZE: i64 = 64 * 1024;

    /// The Arrow schema of this result. Fetched from the engine once and
    /// cached for the life of the result.
    pub fn schema(&mut self) -> Result<SchemaRef> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        let raw = self.handle().raw()?;
        let engine = self.handle().engine();

        let mut ffi_schema = FFI_ArrowSchema::empty();
        status::check(
            "result_arrow_schema",
            engine.result_arrow_schema(raw, &mut ffi_schema),
        )?;
        let schema: SchemaRef = Arc::new(Schema::try_from(&ffi_schema)?);
        self.schema = Some(schema.clone());
        Ok(schema)
    }

    /// Fetch the next chunk of up to `chunk_size` rows as a
    /// [`RecordBatch`]. Non-positive sizes use
    /// [`DEFAULT_CHUNK_SIZE`](QueryResult::DEFAULT_CHUNK_SIZE).
    ///
    /// Returns `Ok(None)` once the result is exhausted.
    pub fn next_batch(&mut self, chunk_size: i64) -> Result<Option<RecordBatch>> {
        let chunk_size = if chunk_size > 0 {
            chunk_size
        } else {
            Self::DEFAULT_CHUNK_SIZE
        };
        let schema = self.schema()?;
        let raw = self.handle().raw()?;
        let engine = self.handle().engine();

        let mut ffi_array = FFI_ArrowArray::empty();
        let mut rows = 0i64;
        status::check(
            "result_arrow_chunk",
            engine.result_arrow_chunk(raw, chunk_size, &mut ffi_array, &mut rows),
        )?;
        if rows == 0 {
            return Ok(None);
        }

        // SAFETY: the engine filled `ffi_array` with a struct-typed array
        // matching the exported schema, with a live release callback. The
        // call consumes the struct; if the import fails, dropping it runs
        // the callback and frees the engine-side buffers.
        let data = unsafe {
            from_ffi_and_data_type(ffi_array, DataType::Struct(schema.fields().clone()))?
        };
        let chunk = StructArray::from(data);
        let batch = RecordBatch::try_new(schema, chunk.columns().to_vec())?;
        tracing::trace!(rows = batch.num_rows(), "imported arrow chunk");
        Ok(Some(batch))
    }
}
