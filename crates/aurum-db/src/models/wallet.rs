use aurum_core::model::Wallet;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::errors::DatabaseError;
use crate::schema::wallets;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = wallets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletRow {
    pub id: i32,
    pub owner: String,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = wallets)]
pub struct NewWalletRow<'a> {
    pub owner: &'a str,
    pub currency: &'a str,
}

impl WalletRow {
    /// Creates the wallet or reactivates the existing one.
    pub fn upsert(owner: &str, currency: &str, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(wallets::table)
            .values(&NewWalletRow { owner, currency })
            .on_conflict((wallets::owner, wallets::currency))
            .do_update()
            .set(wallets::is_active.eq(true))
            .returning(Self::as_returning())
            .get_result(conn)
    }
}

impl TryFrom<WalletRow> for Wallet {
    type Error = DatabaseError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let currency = row.currency.parse().map_err(|_| {
            DatabaseError::decode(
                format!("decode wallet {}", row.id),
                format!("invalid currency '{}'", row.currency),
            )
        })?;

        Ok(Self {
            owner: row.owner,
            currency,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}
