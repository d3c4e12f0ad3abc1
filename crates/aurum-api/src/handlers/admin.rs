use aurum_core::model::Resolution;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use crate::{
    AppState,
    auth::AuthUser,
    dto::{ApiResponse, ResolveTransactionRequest, TransactionDto},
    errors::ApiError,
    extract::ApiJson,
    helpers::track_failure,
};

#[utoipa::path(
    post,
    path = "/api/admin/transactions/{transaction_id}/resolve",
    tag = "Admin",
    params(("transaction_id" = String, Path, description = "Transaction identifier")),
    request_body = ResolveTransactionRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction resolved", body = ApiResponse<TransactionDto>),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Transaction already resolved differently"),
    )
)]
pub async fn resolve_transaction(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(transaction_id): Path<String>,
    ApiJson(payload): ApiJson<ResolveTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resolution = Resolution::from(payload.outcome);
    let txn = state
        .orchestrator
        .resolve_pending(&transaction_id, resolution)
        .await
        .map_err(|err| track_failure(&state, "resolve_transaction", err))?;

    state
        .metrics
        .transactions
        .record_resolution(txn.kind.as_str(), txn.status.as_str());

    info!(
        admin = %admin.id,
        transaction_id = %txn.id,
        status = %txn.status,
        "Transaction resolved by operator",
    );

    Ok(Json(ApiResponse::ok(TransactionDto::from(txn))))
}
