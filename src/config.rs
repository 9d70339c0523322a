//! Database open options and observability hooks.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::engine::SystemConfig;
use crate::error::LadybugError;
use crate::result::QuerySummary;

/// Called after every `query`/`execute` round trip with the query text,
/// the timing summary (zeroed when the call failed before a summary was
/// available) and the outcome.
pub type QueryHook = Arc<dyn Fn(&str, &QuerySummary, Option<&LadybugError>) + Send + Sync>;

/// Options for [`Database::open`](crate::Database::open).
///
/// Zero/empty fields fall back to engine defaults.
#[derive(Clone, Default)]
pub struct Config {
    /// Database path; may be set here instead of the `open` argument.
    pub path: String,
    /// Open the database read-only.
    pub read_only: bool,
    /// Buffer pool size in bytes (0 = engine default).
    pub buffer_pool_size: u64,
    /// Maximum threads for query execution (0 = engine default).
    pub max_num_threads: u64,
    /// Per-query completion hook.
    pub on_query_finished: Option<QueryHook>,
}

impl Config {
    /// The engine-level portion of this config.
    pub(crate) fn system(&self) -> SystemConfig {
        SystemConfig {
            read_only: self.read_only,
            buffer_pool_size: self.buffer_pool_size,
            max_num_threads: self.max_num_threads,
        }
    }

    /// Run the completion hook, if any. A panicking hook is contained and
    /// logged; it never unwinds into the driver.
    pub(crate) fn fire_query_finished(
        &self,
        query: &str,
        summary: &QuerySummary,
        error: Option<&LadybugError>,
    ) {
        if let Some(hook) = &self.on_query_finished {
            let outcome = catch_unwind(AssertUnwindSafe(|| hook(query, summary, error)));
            if outcome.is_err() {
                tracing::warn!(query, "query-finished hook panicked");
            }
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .field("buffer_pool_size", &self.buffer_pool_size)
            .field("max_num_threads", &self.max_num_threads)
            .field(
                "on_query_finished",
                &self.on_query_finished.as_ref().map(|_| "<hook>"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fire_without_hook_is_a_no_op() {
        let config = Config::default();
        config.fire_query_finished("RETURN 1", &QuerySummary::default(), None);
    }

    #[test]
    fn test_hook_receives_arguments() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let config = Config {
            on_query_finished: Some(Arc::new(move |query, summary, error| {
                assert_eq!(query, "RETURN 1");
                assert_eq!(summary.compile_ms, 1.5);
                assert!(error.is_none());
                seen.fetch_add(1, Ordering::SeqCst);
            })),
            ..Config::default()
        };
        let summary = QuerySummary {
            compile_ms: 1.5,
            exec_ms: 2.5,
        };
        config.fire_query_finished("RETURN 1", &summary, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let config = Config {
            on_query_finished: Some(Arc::new(|_, _, _| panic!("hook bug"))),
            ..Config::default()
        };
        // Must not unwind.
        config.fire_query_finished("RETURN 1", &QuerySummary::default(), None);
    }
}
