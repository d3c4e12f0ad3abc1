use aurum_core::model::{
    NewTransaction, Page, Transaction, TransactionFilter, TransactionTotals, UserSettings, Wallet,
};
use aurum_core::{StoreResult, TransactionStore};
use aurum_types::{Currency, PaymentMethod, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use deadpool_diesel::postgres::Pool;
use serde_json::Value as JsonValue;

use crate::errors::DatabaseError;
use crate::models::{NewTransactionRow, RowFilter, TransactionRow, UserSettingsRow, WalletRow};
use crate::pool::Db;

/// `TransactionStore` backed by Postgres.
#[derive(Clone)]
pub struct PgTransactionStore {
    db: Db,
}

impl PgTransactionStore {
    pub const fn new(pool: Pool) -> Self {
        Self { db: Db::new(pool) }
    }
}

fn decode_all(rows: Vec<TransactionRow>) -> Result<Vec<Transaction>, DatabaseError> {
    rows.into_iter().map(Transaction::try_from).collect()
}

impl From<&TransactionFilter> for RowFilter {
    fn from(filter: &TransactionFilter) -> Self {
        let mut kinds: Vec<_> = filter.kinds.iter().map(|k| k.as_str()).collect();
        let mut statuses: Vec<_> = filter.statuses.iter().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        statuses.sort_unstable();

        Self {
            kinds,
            statuses,
            limit: filter.limit,
            offset: filter.offset,
        }
    }
}

#[async_trait::async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
        let new_row = NewTransactionRow::from(new);
        let row = self
            .db
            .run(format!("insert transaction {}", new_row.id), move |conn| {
                TransactionRow::create(&new_row, conn)
            })
            .await?;

        Ok(Transaction::try_from(row)?)
    }

    async fn find_transaction(&self, owner: &str, id: &str) -> StoreResult<Option<Transaction>> {
        let (owner, id) = (owner.to_string(), id.to_string());
        let row = self
            .db
            .run(format!("find transaction {id}"), move |conn| {
                TransactionRow::find_owned(&id, &owner, conn)
            })
            .await?;

        Ok(row.map(Transaction::try_from).transpose()?)
    }

    async fn find_transaction_by_id(&self, id: &str) -> StoreResult<Option<Transaction>> {
        let id = id.to_string();
        let row = self
            .db
            .run(format!("find transaction {id}"), move |conn| {
                TransactionRow::find(&id, conn)
            })
            .await?;

        Ok(row.map(Transaction::try_from).transpose()?)
    }

    async fn list_transactions(
        &self,
        owner: &str,
        filter: &TransactionFilter,
    ) -> StoreResult<Page<Transaction>> {
        let owner = owner.to_string();
        let row_filter = RowFilter::from(filter);
        let (rows, total) = self
            .db
            .run(format!("list transactions of {owner}"), move |conn| {
                TransactionRow::page(&owner, &row_filter, conn)
            })
            .await?;

        Ok(Page {
            items: decode_all(rows)?,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    async fn transition_status(
        &self,
        id: &str,
        from: TransactionStatus,
        to: TransactionStatus,
        metadata_patch: Option<JsonValue>,
    ) -> StoreResult<Option<Transaction>> {
        let id = id.to_string();
        let row = self
            .db
            .run(
                format!("transition transaction {id} from {from} to {to}"),
                move |conn| {
                    TransactionRow::transition(
                        &id,
                        from.as_str(),
                        to.as_str(),
                        metadata_patch.as_ref(),
                        conn,
                    )
                },
            )
            .await?;

        Ok(row.map(Transaction::try_from).transpose()?)
    }

    async fn find_stale_pending(
        &self,
        kind: TransactionKind,
        method: PaymentMethod,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = self
            .db
            .run(
                format!("find stale pending {kind} via {method}"),
                move |conn| {
                    TransactionRow::find_stale_pending(
                        kind.as_str(),
                        method.as_str(),
                        created_before,
                        conn,
                    )
                },
            )
            .await?;

        Ok(decode_all(rows)?)
    }

    async fn totals(&self, owner: &str) -> StoreResult<TransactionTotals> {
        let owner = owner.to_string();
        let totals = self
            .db
            .run(format!("compute totals of {owner}"), move |conn| {
                TransactionRow::totals(&owner, conn)
            })
            .await?;

        Ok(TransactionTotals {
            completed_deposits: totals.completed_deposits,
            completed_withdrawals: totals.completed_withdrawals,
            pending_count: totals.pending_count,
        })
    }

    async fn upsert_wallet(&self, owner: &str, currency: Currency) -> StoreResult<Wallet> {
        let owner = owner.to_string();
        let row = self
            .db
            .run(format!("upsert {currency} wallet of {owner}"), move |conn| {
                WalletRow::upsert(&owner, currency.as_ref(), conn)
            })
            .await?;

        Ok(Wallet::try_from(row)?)
    }

    async fn get_or_create_settings(&self, owner: &str) -> StoreResult<UserSettings> {
        let owner = owner.to_string();
        let row = self
            .db
            .run(format!("get settings of {owner}"), move |conn| {
                UserSettingsRow::get_or_create(&owner, conn)
            })
            .await?;

        Ok(row.into())
    }

    async fn swap_initial_deposit(
        &self,
        owner: &str,
        expected: bool,
        value: bool,
    ) -> StoreResult<bool> {
        let owner = owner.to_string();
        Ok(self
            .db
            .run(
                format!("swap initial deposit flag of {owner}"),
                move |conn| UserSettingsRow::swap_initial_deposit(&owner, expected, value, conn),
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_row_filter_uses_storage_names() {
        let filter = TransactionFilter {
            kinds: HashSet::from([TransactionKind::Withdrawal, TransactionKind::Deposit]),
            statuses: HashSet::from([TransactionStatus::Pending]),
            limit: 25,
            offset: 50,
        };

        let row_filter = RowFilter::from(&filter);
        assert_eq!(row_filter.kinds, vec!["deposit", "withdrawal"]);
        assert_eq!(row_filter.statuses, vec!["pending"]);
        assert_eq!(row_filter.limit, 25);
        assert_eq!(row_filter.offset, 50);
    }

    #[test]
    fn test_empty_filter_stays_empty() {
        let row_filter = RowFilter::from(&TransactionFilter::default());
        assert!(row_filter.kinds.is_empty());
        assert!(row_filter.statuses.is_empty());
    }
}
