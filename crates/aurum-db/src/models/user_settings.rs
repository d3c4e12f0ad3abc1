use aurum_core::model::UserSettings;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::schema::user_settings;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = user_settings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserSettingsRow {
    pub owner: String,
    pub has_initial_deposit: bool,
    pub updated_at: DateTime<Utc>,
}

impl UserSettingsRow {
    fn ensure_exists(owner: &str, conn: &mut PgConnection) -> QueryResult<usize> {
        diesel::insert_into(user_settings::table)
            .values(user_settings::owner.eq(owner))
            .on_conflict(user_settings::owner)
            .do_nothing()
            .execute(conn)
    }

    pub fn get_or_create(owner: &str, conn: &mut PgConnection) -> QueryResult<Self> {
        Self::ensure_exists(owner, conn)?;
        user_settings::table
            .find(owner)
            .select(Self::as_select())
            .first(conn)
    }

    /// Conditional update of the initial deposit flag. Returns whether a row changed.
    pub fn swap_initial_deposit(
        owner: &str,
        expected: bool,
        value: bool,
        conn: &mut PgConnection,
    ) -> QueryResult<bool> {
        Self::ensure_exists(owner, conn)?;
        let updated = diesel::update(
            user_settings::table
                .find(owner)
                .filter(user_settings::has_initial_deposit.eq(expected)),
        )
        .set((
            user_settings::has_initial_deposit.eq(value),
            user_settings::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;

        Ok(updated > 0)
    }
}

impl From<UserSettingsRow> for UserSettings {
    fn from(row: UserSettingsRow) -> Self {
        Self {
            owner: row.owner,
            has_initial_deposit: row.has_initial_deposit,
            updated_at: row.updated_at,
        }
    }
}
