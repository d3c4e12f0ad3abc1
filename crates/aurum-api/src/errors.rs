use aurum_core::{CoreError, PolicyViolation};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::auth::AuthError;
use crate::dto::ApiResponse;

pub const INITIAL_DEPOSIT_REQUIRED: &str = "INITIAL_DEPOSIT_REQUIRED";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Policy violation: {0}")]
    Policy(PolicyViolation),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Initial deposit required")]
    InitialDepositRequired { required_action: &'static str },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Transaction could not be completed")]
    TransactionFailed {
        transaction_id: Option<String>,
        retriable: bool,
    },
    #[error("Internal server error")]
    InternalServerError,
}

impl ApiError {
    /// Stable machine readable code, also used as a metric label.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "VALIDATION_ERROR",
            Self::Policy(violation) => violation.code(),
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InitialDepositRequired { .. } => INITIAL_DEPOSIT_REQUIRED,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "INVALID_STATE",
            Self::TransactionFailed { .. } => "TRANSACTION_FAILED",
            Self::InternalServerError => "INTERNAL_ERROR",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::BadRequest(msg),
            CoreError::Policy(violation) => Self::Policy(violation),
            CoreError::NotFound(msg) => Self::NotFound(msg),
            CoreError::InvalidState(msg) => Self::Conflict(msg),
            CoreError::InitialDepositRequired { required_action } => {
                Self::InitialDepositRequired { required_action }
            }
            CoreError::Upstream {
                source,
                transaction_id,
            } => {
                // NOTE: details stay in the logs, never in the response body
                tracing::error!(
                    operation = %source.operation,
                    error = %source.message,
                    transaction_id = ?transaction_id,
                    "Upstream failure",
                );
                match transaction_id {
                    Some(_) => Self::TransactionFailed {
                        transaction_id,
                        retriable: source.retriable,
                    },
                    None => Self::InternalServerError,
                }
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => Self::Unauthorized("Missing bearer token".to_string()),
            AuthError::InvalidToken => {
                Self::Unauthorized("Invalid or expired token".to_string())
            }
            AuthError::Provider(msg) => {
                tracing::error!(error = %msg, "Identity provider unavailable");
                Self::InternalServerError
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected request body");
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();
        let (status, response) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiResponse::error(msg)),
            Self::Policy(violation) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::error(violation.to_string()),
            ),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, ApiResponse::error(msg)),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, ApiResponse::error(msg)),
            Self::InitialDepositRequired { required_action } => (
                StatusCode::FORBIDDEN,
                ApiResponse::error("Initial deposit required to access this feature".to_string())
                    .with_required_action(required_action),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, ApiResponse::error(msg)),
            Self::Conflict(msg) => (StatusCode::CONFLICT, ApiResponse::error(msg)),
            Self::TransactionFailed {
                transaction_id,
                retriable,
            } => {
                let msg = if retriable {
                    "Transaction could not be completed, please try again"
                } else {
                    "Transaction could not be completed"
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiResponse::error(msg.to_string()).with_transaction_id(transaction_id),
                )
            }
            Self::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::error("Internal server error".to_string()),
            ),
        };
        let response: ApiResponse<()> = response.with_code(code);
        (status, Json(response)).into_response()
    }
}
