use aurum_core::Subscription;
use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};

use crate::{AppState, auth::AuthUser, dto::ChangeEventDto};

#[utoipa::path(
    get,
    path = "/api/transactions/stream",
    tag = "Transactions",
    security(("bearer_auth" = [])),
    responses(
        (status = 101, description = "Websocket of change events", body = ChangeEventDto),
    )
)]
pub async fn stream_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let subscription = state.orchestrator.feed().subscribe(&user.id);
    ws.on_upgrade(move |socket| forward_events(socket, subscription))
}

async fn forward_events(mut socket: WebSocket, mut subscription: Subscription) {
    tracing::debug!(user = subscription.user_id(), "Transaction stream opened");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&ChangeEventDto::from(event)) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(error = %e, "Could not encode change event");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    tracing::debug!(user = subscription.user_id(), "Transaction stream closed");
    subscription.unsubscribe();
}
