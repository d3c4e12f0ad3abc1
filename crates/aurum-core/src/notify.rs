use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::error::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DepositCompleted,
    DepositPending,
    DepositFailed,
    WithdrawalRequested,
    WithdrawalCancelled,
    WithdrawalCompleted,
    WithdrawalFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(
        user_id: &str,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Fire-and-forget user notifications. Delivery is not guaranteed.
#[async_trait::async_trait]
pub trait NotificationEmitter: Send + Sync {
    async fn emit(&self, notification: Notification) -> Result<(), UpstreamError>;
}

/// Emitter that only records notifications in the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl NotificationEmitter for TracingNotifier {
    async fn emit(&self, notification: Notification) -> Result<(), UpstreamError> {
        tracing::info!(
            user = %notification.user_id,
            kind = %notification.kind,
            title = %notification.title,
            "Notification emitted",
        );
        Ok(())
    }
}
