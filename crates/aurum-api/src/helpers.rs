use aurum_core::CoreError;

use crate::{AppState, errors::ApiError};

/// Converts a domain error, counting it against `operation`.
pub fn track_failure(state: &AppState, operation: &'static str, err: CoreError) -> ApiError {
    let err = ApiError::from(err);
    state
        .metrics
        .transactions
        .record_failure(operation, err.code());
    err
}
