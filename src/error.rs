//! Error types for the Ladybug driver.
//!
//! Every fallible operation in this crate returns [`LadybugError`], which
//! distinguishes structural misuse (closed handles, dead connections, bad
//! arguments) from engine-reported failures and from cancellation, so that
//! callers can retry transient conditions without masking real bugs.

use thiserror::Error;

/// Error type covering every failure mode of the driver.
#[derive(Error, Debug)]
pub enum LadybugError {
    /// A caller-supplied argument was rejected before reaching the engine
    /// (empty database path, too many scan destinations, and so on).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted on a handle that has already been closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    /// An operation was routed through a connection that no longer exists.
    #[error("invalid connection")]
    InvalidConnection,

    /// The engine reported a failure status for the named operation.
    #[error("engine error in {op}: {message}")]
    Engine {
        /// Engine call that failed.
        op: &'static str,
        /// Engine-supplied message, or a generic one if none was available.
        message: String,
    },

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A decoded value did not match the requested narrow type.
    #[error("column {index} is not {expected} (got {actual})")]
    TypeMismatch {
        /// Column index the narrowing was requested for.
        index: usize,
        /// Type name the caller asked for.
        expected: &'static str,
        /// Tag of the value actually decoded.
        actual: &'static str,
    },

    /// The engine could not allocate the backing memory for a handle.
    #[error("allocation failure in {op}")]
    AllocationFailure {
        /// Engine call that failed to allocate.
        op: &'static str,
    },

    /// Columnar schema or batch import failed.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl LadybugError {
    /// True for [`Cancelled`](Self::Cancelled) and
    /// [`DeadlineExceeded`](Self::DeadlineExceeded), the two transient
    /// context-originated errors a caller may want to retry.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            LadybugError::Cancelled | LadybugError::DeadlineExceeded
        )
    }
}

/// Crate-wide result alias using [`LadybugError`].
pub type Result<T> = std::result::Result<T, LadybugError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LadybugError::Closed("result");
        assert_eq!(err.to_string(), "result is closed");

        let err = LadybugError::Engine {
            op: "query",
            message: "parser error".to_string(),
        };
        assert!(err.to_string().contains("query"));
        assert!(err.to_string().contains("parser error"));

        let err = LadybugError::TypeMismatch {
            index: 2,
            expected: "int64",
            actual: "string",
        };
        assert_eq!(err.to_string(), "column 2 is not int64 (got string)");
    }

    #[test]
    fn test_is_cancellation() {
        assert!(LadybugError::Cancelled.is_cancellation());
        assert!(LadybugError::DeadlineExceeded.is_cancellation());
        assert!(!LadybugError::InvalidConnection.is_cancellation());
        assert!(!LadybugError::AllocationFailure { op: "query" }.is_cancellation());
    }
}
