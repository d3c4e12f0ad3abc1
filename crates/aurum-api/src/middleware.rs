use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use aurum_core::CoreError;
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use crate::AppState;
use crate::auth::{AuthError, AuthUser};
use crate::errors::ApiError;

/// Resolves the bearer token and stores the `AuthUser` in request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| AuthError::MissingToken)?;
    let user = state.verifier.verify(bearer.token()).await?;

    tracing::debug!(user = %user.id, role = %user.role, "Request authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Rejects non-admin users who have not completed their initial deposit.
pub async fn require_initial_deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match state.gate.require_initial_deposit(&user.id, user.role).await {
        Ok(()) => Ok(next.run(request).await),
        Err(err @ CoreError::InitialDepositRequired { .. }) => {
            let path = request.uri().path();
            state.metrics.transactions.record_gate_rejection(path);
            tracing::info!(user = %user.id, path, "Initial deposit gate rejected request");
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn require_admin(
    Extension(user): Extension<AuthUser>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !user.role.is_admin() {
        tracing::warn!(user = %user.id, path = %request.uri().path(), "Admin route refused");
        return Err(ApiError::Forbidden("Admin role required".to_string()));
    }

    Ok(next.run(request).await)
}
