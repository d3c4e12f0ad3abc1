use aurum_core::{Notification, NotificationEmitter, UpstreamError};
use deadpool_diesel::postgres::Pool;

use crate::models::NewNotificationRow;
use crate::pool::Db;

/// Stores notifications in the `notifications` table for the user inbox.
#[derive(Clone)]
pub struct PgNotificationEmitter {
    db: Db,
}

impl PgNotificationEmitter {
    pub const fn new(pool: Pool) -> Self {
        Self { db: Db::new(pool) }
    }
}

#[async_trait::async_trait]
impl NotificationEmitter for PgNotificationEmitter {
    async fn emit(&self, notification: Notification) -> Result<(), UpstreamError> {
        let row = NewNotificationRow::from(notification);
        self.db
            .run(format!("store notification for {}", row.user_id), move |conn| {
                row.insert(conn)
            })
            .await?;
        Ok(())
    }
}
