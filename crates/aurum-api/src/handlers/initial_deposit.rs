use aurum_core::model::DepositRequest;
use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{
    AppState,
    auth::AuthUser,
    dto::{ApiResponse, DepositResponse, InitialDepositRequest, InitialDepositStatusDto},
    errors::ApiError,
    extract::ApiJson,
    handlers::transactions::submit_deposit,
    helpers::track_failure,
};

#[utoipa::path(
    get,
    path = "/api/initial-deposit/status",
    tag = "Initial deposit",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Whether the initial deposit was processed", body = ApiResponse<InitialDepositStatusDto>),
    )
)]
pub async fn get_initial_deposit_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .gate
        .status(&user.id)
        .await
        .map_err(|err| track_failure(&state, "initial_deposit_status", err))?;

    Ok(Json(ApiResponse::ok(InitialDepositStatusDto::from(status))))
}

#[utoipa::path(
    post,
    path = "/api/initial-deposit/process",
    tag = "Initial deposit",
    request_body = InitialDepositRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Initial deposit accepted", body = ApiResponse<DepositResponse>),
        (status = 400, description = "Below minimum or already processed"),
    )
)]
pub async fn process_initial_deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<InitialDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = DepositRequest {
        amount: payload.amount.normalize(),
        currency: payload.currency,
        method: payload.payment_method,
        is_initial: true,
    };

    submit_deposit(&state, &user, request).await
}
