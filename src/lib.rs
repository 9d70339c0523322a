//! Safe Rust client for the Ladybug embedded graph engine.
//!
//! The driver wraps the engine's C-style handle API behind owned facade
//! objects with a strict lifecycle: a [`Database`] hands out
//! [`Connection`]s, connections run queries (directly or through a
//! [`PreparedStatement`]) into a [`QueryResult`], and results yield
//! borrowed [`Row`]s whose columns decode into [`Value`]. Each facade owns
//! exactly one engine handle and releases it once, on explicit close or on
//! drop.
//!
//! Blocking calls take a [`Context`]: cancel it, or give it a deadline,
//! and the in-flight query is interrupted engine-side while the call
//! returns [`LadybugError::Cancelled`] or
//! [`LadybugError::DeadlineExceeded`]. Results can also be drained
//! column-wise as Arrow [`RecordBatch`](arrow::record_batch::RecordBatch)
//! chunks without copying row data, see
//! [`QueryResult::next_batch`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use ladybug::engine::mem::{MemoryEngine, ScriptedResult};
//! use ladybug::{Context, Database, Value};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! engine.script(
//!     "MATCH (p:Person) RETURN p.name, p.age",
//!     ScriptedResult::from_values(
//!         &["name", "age"],
//!         vec![vec![Value::String("Ann".into()), Value::Int64(41)]],
//!     ),
//! );
//!
//! let db = Database::open(engine, "people.db", None)?;
//! let ctx = Context::background();
//! let conn = db.connect(&ctx)?;
//! let mut result = conn.query(&ctx, "MATCH (p:Person) RETURN p.name, p.age")?;
//! while let Some(row) = result.next() {
//!     let (name, age): (String, i64) = row.scan()?;
//!     println!("{name} is {age}");
//! }
//! # Ok::<(), ladybug::LadybugError>(())
//! ```

mod columnar;
mod config;
mod connection;
mod context;
mod database;
mod decode;
pub mod engine;
mod error;
mod handle;
mod prepared;
mod result;
mod row;
mod value;

pub use config::{Config, QueryHook};
pub use connection::Connection;
pub use context::{CancelHandle, Context};
pub use database::Database;
pub use error::{LadybugError, Result};
pub use prepared::PreparedStatement;
pub use result::{QueryResult, QuerySummary};
pub use row::{FromRow, FromValue, Row};
pub use value::{Node, Rel, Value};
