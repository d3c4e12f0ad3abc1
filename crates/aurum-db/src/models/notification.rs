use aurum_core::Notification;
use diesel::prelude::*;

use crate::schema::notifications;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotificationRow {
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
}

impl From<Notification> for NewNotificationRow {
    fn from(notification: Notification) -> Self {
        Self {
            user_id: notification.user_id,
            kind: notification.kind.to_string(),
            title: notification.title,
            message: notification.message,
        }
    }
}

impl NewNotificationRow {
    pub fn insert(&self, conn: &mut PgConnection) -> QueryResult<usize> {
        diesel::insert_into(notifications::table)
            .values(self)
            .execute(conn)
    }
}
