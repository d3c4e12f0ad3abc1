use aurum_core::{LedgerError, UpstreamError};
use diesel::result::Error as DieselError;
use std::fmt::Display;
use thiserror::Error;

/// Error type for database pool initialization
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("cannot init database pool : {0}")]
    Pool(String),
    #[error("cannot run database migrations : {0}")]
    Migration(String),
}

/// Unified database error type with context for runtime operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to get connection from pool for operation '{operation}': {message}")]
    PoolError { operation: String, message: String },

    #[error("Database interaction failed for operation '{operation}': {message}")]
    InteractionError { operation: String, message: String },

    #[error("Record not found in operation '{operation}'")]
    NotFound { operation: String },

    #[error("Database query error in operation '{operation}': {message}")]
    QueryError { operation: String, message: String },

    #[error("Stored row cannot be decoded in operation '{operation}': {message}")]
    DecodeError { operation: String, message: String },

    #[error("Unique constraint violation in operation '{operation}': {message}")]
    UniqueViolation { operation: String, message: String },
}

impl DatabaseError {
    pub fn decode(operation: impl Display, message: impl Display) -> Self {
        Self::DecodeError {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Connection and query failures may succeed on retry, constraint and
    /// decoding failures will not.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::PoolError { .. } | Self::InteractionError { .. } | Self::QueryError { .. }
        )
    }

    /// Fills in the operation of errors converted without context.
    #[must_use]
    pub fn with_operation(mut self, context: &str) -> Self {
        match &mut self {
            Self::PoolError { operation, .. }
            | Self::InteractionError { operation, .. }
            | Self::NotFound { operation }
            | Self::QueryError { operation, .. }
            | Self::DecodeError { operation, .. }
            | Self::UniqueViolation { operation, .. } => {
                if operation == "unknown" {
                    *operation = context.to_string();
                }
            }
        }
        self
    }

    /// Extract the operation context from the error
    pub fn operation(&self) -> &str {
        match self {
            Self::PoolError { operation, .. }
            | Self::InteractionError { operation, .. }
            | Self::NotFound { operation }
            | Self::QueryError { operation, .. }
            | Self::DecodeError { operation, .. }
            | Self::UniqueViolation { operation, .. } => operation,
        }
    }
}

impl From<DieselError> for DatabaseError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound {
                operation: "unknown".to_string(),
            },
            DieselError::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            ) => Self::UniqueViolation {
                operation: "unknown".to_string(),
                message: info.message().to_string(),
            },
            other => Self::QueryError {
                operation: "unknown".to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<DatabaseError> for UpstreamError {
    fn from(err: DatabaseError) -> Self {
        let operation = err.operation().to_string();
        if err.is_transient() {
            Self::new(operation, err)
        } else {
            Self::permanent(operation, err)
        }
    }
}

impl From<DatabaseError> for LedgerError {
    fn from(err: DatabaseError) -> Self {
        Self::Upstream(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retriable() {
        let err: UpstreamError = DatabaseError::PoolError {
            operation: "list transactions".to_string(),
            message: "timed out".to_string(),
        }
        .into();
        assert!(err.retriable);
        assert_eq!(err.operation, "list transactions");
    }

    #[test]
    fn test_constraint_errors_are_permanent() {
        let err: UpstreamError = DatabaseError::UniqueViolation {
            operation: "insert transaction".to_string(),
            message: "duplicate key".to_string(),
        }
        .into();
        assert!(!err.retriable);
    }

    #[test]
    fn test_diesel_not_found_maps() {
        let err = DatabaseError::from(DieselError::NotFound);
        assert!(err.is_not_found());
        assert_eq!(err.operation(), "unknown");

        let err = err.with_operation("find settings");
        assert_eq!(err.operation(), "find settings");
    }
}
