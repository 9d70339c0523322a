//! Database lifecycle.

use std::sync::Arc;

use crate::config::Config;
use crate::connection::Connection;
use crate::context::Context;
use crate::engine::status;
use crate::engine::{Engine, HandleSlot};
use crate::error::{LadybugError, Result};
use crate::handle::{HandleKind, OwnedHandle};

/// An open database. Connections borrow it via reference counting, so
/// dropping the `Database` after handing out connections is safe; the
/// engine-side object is only released when the last facade goes.
#[derive(Debug)]
pub struct Database {
    handle: Arc<OwnedHandle>,
    config: Arc<Config>,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// The path may come from either the argument or `config.path`; the
    /// argument wins when both are set, and an empty effective path is an
    /// error. `config: None` uses engine defaults throughout.
    pub fn open(engine: Arc<dyn Engine>, path: &str, config: Option<Config>) -> Result<Database> {
        let mut config = config.unwrap_or_default();
        if !path.is_empty() {
            config.path = path.to_string();
        }
        if config.path.is_empty() {
            return Err(LadybugError::InvalidArgument(
                "database path is required".to_string(),
            ));
        }

        let mut slot = HandleSlot::empty();
        let state = engine.database_init(&config.path, &config.system(), &mut slot);
        status::check("database_init", state)?;
        let raw = slot.take().ok_or_else(|| status::missing_handle("database_init"))?;
        tracing::debug!(path = %config.path, "database opened");

        Ok(Database {
            handle: Arc::new(OwnedHandle::new(engine, HandleKind::Database, raw)),
            config: Arc::new(config),
        })
    }

    /// Create a new connection.
    pub fn connect(&self, ctx: &Context) -> Result<Connection> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let db = self.handle.raw()?;
        let engine = self.handle.engine().clone();

        let mut slot = HandleSlot::empty();
        let state = engine.connection_init(db, &mut slot);
        status::check("connection_init", state)?;
        let raw = slot
            .take()
            .ok_or_else(|| status::missing_handle("connection_init"))?;

        Ok(Connection::new(
            OwnedHandle::new(engine, HandleKind::Connection, raw),
            self.handle.clone(),
            self.config.clone(),
        ))
    }

    /// Release the database handle. Idempotent. Outstanding connections
    /// fail their next call against the engine rather than crash.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}
