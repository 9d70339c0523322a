//! Translation of engine status codes into the driver error taxonomy.

use super::{Engine, RawHandle, State};
use crate::error::{LadybugError, Result};

/// Map a call status to `Ok(())` or the matching driver error, tagging the
/// error with the operation name for diagnosis.
pub(crate) fn check(op: &'static str, state: State) -> Result<()> {
    check_msg(op, state, None)
}

/// Like [`check`], with an engine-supplied message when one is available.
pub(crate) fn check_msg(op: &'static str, state: State, message: Option<String>) -> Result<()> {
    match state {
        State::Success => Ok(()),
        State::AllocFailed => Err(LadybugError::AllocationFailure { op }),
        State::Error => Err(LadybugError::Engine {
            op,
            message: message.unwrap_or_else(|| "operation failed".to_string()),
        }),
    }
}

/// Build the error for an init-style call that reported success but left
/// its output slot empty. Defensive: a conforming engine never does this.
pub(crate) fn missing_handle(op: &'static str) -> LadybugError {
    LadybugError::Engine {
        op,
        message: "engine returned no handle".to_string(),
    }
}

/// Check a result handle's own success predicate, copying the engine's
/// error message out before the caller releases the handle.
pub(crate) fn result_error(engine: &dyn Engine, op: &'static str, result: RawHandle) -> Result<()> {
    if engine.result_is_success(result) {
        return Ok(());
    }
    check_msg(op, State::Error, engine.result_error_message(result))
}

/// Check a prepared statement's compilation predicate, same contract as
/// [`result_error`].
pub(crate) fn statement_error(
    engine: &dyn Engine,
    op: &'static str,
    stmt: RawHandle,
) -> Result<()> {
    if engine.statement_is_success(stmt) {
        return Ok(());
    }
    check_msg(op, State::Error, engine.statement_error_message(stmt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_success() {
        assert!(check("query", State::Success).is_ok());
    }

    #[test]
    fn test_check_alloc_failure() {
        match check("connection_init", State::AllocFailed) {
            Err(LadybugError::AllocationFailure { op }) => assert_eq!(op, "connection_init"),
            other => panic!("expected AllocationFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_check_error_uses_message() {
        let err = check_msg("query", State::Error, Some("syntax error".to_string())).unwrap_err();
        assert!(err.to_string().contains("syntax error"));

        let err = check("query", State::Error).unwrap_err();
        assert!(err.to_string().contains("operation failed"));
    }
}
