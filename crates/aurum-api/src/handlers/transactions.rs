use aurum_core::model::{DepositRequest, TransactionFilter, WithdrawalRequest, meta};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use crate::{
    AppState,
    auth::AuthUser,
    dto::{
        AccountSummaryDto, ApiResponse, CreateDepositRequest, CreateWithdrawalRequest,
        DepositResponse, Pagination, TransactionDto, TransactionHistoryQuery,
    },
    errors::ApiError,
    extract::{ApiJson, ApiQuery},
    helpers::track_failure,
};

#[utoipa::path(
    get,
    path = "/api/transactions",
    tag = "Transactions",
    params(TransactionHistoryQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Page of transactions, newest first", body = ApiResponse<Vec<TransactionDto>>),
        (status = 400, description = "Invalid filter or pagination"),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<TransactionHistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = TransactionFilter::try_from(query)?;
    let page = state
        .orchestrator
        .get_transaction_history(&user.id, filter)
        .await
        .map_err(|err| track_failure(&state, "list_transactions", err))?;

    let pagination = Pagination {
        total: page.total,
        limit: page.limit,
        offset: page.offset,
    };
    let items: Vec<TransactionDto> = page.items.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::paginated(items, pagination)))
}

#[utoipa::path(
    get,
    path = "/api/transactions/summary",
    tag = "Transactions",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Balance and transaction totals", body = ApiResponse<AccountSummaryDto>),
        (status = 401, description = "Missing or invalid token"),
    )
)]
pub async fn get_account_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .orchestrator
        .account_summary(&user.id)
        .await
        .map_err(|err| track_failure(&state, "account_summary", err))?;

    Ok(Json(ApiResponse::ok(AccountSummaryDto::from(summary))))
}

#[utoipa::path(
    get,
    path = "/api/transactions/{transaction_id}",
    tag = "Transactions",
    params(("transaction_id" = String, Path, description = "Transaction identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Transaction details", body = ApiResponse<TransactionDto>),
        (status = 404, description = "Transaction not found"),
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transaction_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let txn = state
        .orchestrator
        .get_transaction_details(&user.id, &transaction_id)
        .await
        .map_err(|err| track_failure(&state, "get_transaction", err))?;

    Ok(Json(ApiResponse::ok(TransactionDto::from(txn))))
}

/// Runs a deposit for `user` and records it.
pub(crate) async fn submit_deposit(
    state: &AppState,
    user: &AuthUser,
    request: DepositRequest,
) -> Result<(StatusCode, Json<ApiResponse<DepositResponse>>), ApiError> {
    let (method, currency, is_initial) = (request.method, request.currency, request.is_initial);
    let receipt = state
        .orchestrator
        .process_deposit(&user.id, request)
        .await
        .map_err(|err| track_failure(state, "process_deposit", err))?;

    state.metrics.transactions.record_deposit(
        method.as_str(),
        currency.as_ref(),
        receipt.transaction.status.as_str(),
        is_initial,
    );

    info!(
        user = %user.id,
        transaction_id = %receipt.transaction.id,
        amount = %receipt.transaction.amount,
        status = %receipt.transaction.status,
        "Deposit accepted",
    );

    let message = if receipt.requires_confirmation {
        "Deposit pending confirmation"
    } else {
        "Deposit completed"
    };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(DepositResponse::from(receipt)).with_message(message)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/transactions/deposit",
    tag = "Transactions",
    request_body = CreateDepositRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Deposit completed, or pending for crypto", body = ApiResponse<DepositResponse>),
        (status = 400, description = "Invalid amount, method or duplicate initial deposit"),
        (status = 500, description = "Ledger failure, the transaction is marked failed"),
    )
)]
pub async fn create_deposit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let CreateDepositRequest {
        amount,
        currency,
        payment_method,
        is_initial_deposit,
    } = payload;

    let request = DepositRequest {
        amount: amount.normalize(),
        currency,
        method: payment_method,
        is_initial: is_initial_deposit,
    };

    submit_deposit(&state, &user, request).await
}

#[utoipa::path(
    post,
    path = "/api/transactions/withdraw",
    tag = "Transactions",
    request_body = CreateWithdrawalRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Withdrawal request created", body = ApiResponse<TransactionDto>),
        (status = 400, description = "Invalid request or insufficient balance"),
        (status = 403, description = "Initial deposit required"),
    )
)]
pub async fn create_withdrawal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<CreateWithdrawalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let CreateWithdrawalRequest {
        amount,
        wallet_address,
        network,
    } = payload;

    let request = WithdrawalRequest {
        amount: amount.normalize(),
        wallet_address,
        network,
    };
    let txn = state
        .orchestrator
        .create_withdrawal_request(&user.id, request)
        .await
        .map_err(|err| track_failure(&state, "create_withdrawal", err))?;

    state
        .metrics
        .transactions
        .record_withdrawal_requested(txn.meta_str(meta::NETWORK).unwrap_or_default());

    info!(
        user = %user.id,
        transaction_id = %txn.id,
        amount = %txn.amount,
        "Withdrawal request accepted",
    );

    Ok((
        StatusCode::CREATED,
        Json(
            ApiResponse::ok(TransactionDto::from(txn))
                .with_message("Withdrawal request submitted"),
        ),
    ))
}

#[utoipa::path(
    post,
    path = "/api/transactions/{transaction_id}/cancel",
    tag = "Transactions",
    params(("transaction_id" = String, Path, description = "Transaction identifier")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Withdrawal cancelled and refunded", body = ApiResponse<TransactionDto>),
        (status = 404, description = "Transaction not found"),
        (status = 409, description = "Transaction is not a pending withdrawal"),
    )
)]
pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transaction_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let txn = state
        .orchestrator
        .cancel_withdrawal_request(&user.id, &transaction_id)
        .await
        .map_err(|err| track_failure(&state, "cancel_withdrawal", err))?;

    state.metrics.transactions.record_withdrawal_cancelled();

    Ok(Json(
        ApiResponse::ok(TransactionDto::from(txn)).with_message("Withdrawal cancelled"),
    ))
}
