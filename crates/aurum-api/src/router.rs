use axum::http::StatusCode;
use axum::{Json, Router};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::IntoResponse;
use axum::routing::{get, post};

use utoipa::OpenApi as OpenApiT;
use utoipa_swagger_ui::SwaggerUi;

use crate::dto::ApiResponse;
use crate::{AppState, handlers, middleware};

pub fn api_router<T: OpenApiT>(state: AppState) -> Router<AppState> {
    let open_api = T::openapi();

    let transactions_router = Router::new()
        .route("/", get(handlers::list_transactions))
        .route("/summary", get(handlers::get_account_summary))
        .route("/stream", get(handlers::stream_transactions))
        .route("/deposit", post(handlers::create_deposit))
        .route(
            "/withdraw",
            post(handlers::create_withdrawal).route_layer(from_fn_with_state(
                state.clone(),
                middleware::require_initial_deposit,
            )),
        )
        .route("/{transaction_id}", get(handlers::get_transaction))
        .route(
            "/{transaction_id}/cancel",
            post(handlers::cancel_withdrawal),
        );

    let initial_deposit_router = Router::new()
        .route("/status", get(handlers::get_initial_deposit_status))
        .route("/process", post(handlers::process_initial_deposit));

    let admin_router = Router::new()
        .route(
            "/transactions/{transaction_id}/resolve",
            post(handlers::resolve_transaction),
        )
        .route_layer(from_fn(middleware::require_admin));

    // every /api route needs a verified user
    let authenticated = Router::new()
        .nest("/transactions", transactions_router)
        .nest("/initial-deposit", initial_deposit_router)
        .nest("/admin", admin_router)
        .route_layer(from_fn_with_state(state, middleware::require_auth));

    Router::new()
        .route("/health", get(health))
        .nest("/api", authenticated)
        .merge(SwaggerUi::new("/api/docs").url("/api/docs/openapi.json", open_api))
        .fallback(handler_404)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(
            ApiResponse::<()>::error("The requested resource was not found".to_string())
                .with_code("NOT_FOUND"),
        ),
    )
}
