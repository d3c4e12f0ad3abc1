use std::str::FromStr;

use aurum_core::model::{NewTransaction, Transaction, merge_metadata};
use aurum_types::{TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use diesel::dsl::sum;
use diesel::pg::Pg;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::errors::DatabaseError;
use crate::schema::transactions;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransactionRow {
    pub id: String,
    pub seq: i64,
    pub owner: String,
    pub kind: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransactionRow {
    pub id: String,
    pub owner: String,
    pub kind: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub metadata: JsonValue,
}

impl From<NewTransaction> for NewTransactionRow {
    fn from(new: NewTransaction) -> Self {
        Self {
            id: new.id,
            owner: new.owner,
            kind: new.kind.as_str().to_string(),
            amount: new.amount,
            currency: new.currency.to_string(),
            status: new.status.as_str().to_string(),
            payment_method: new.payment_method.map(|m| m.as_str().to_string()),
            metadata: new.metadata,
        }
    }
}

/// Owner scoped listing query. Empty sets do not filter.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub kinds: Vec<&'static str>,
    pub statuses: Vec<&'static str>,
    pub limit: i64,
    pub offset: i64,
}

/// Sums over one owner's rows.
#[derive(Debug, Clone, Default)]
pub struct RowTotals {
    pub completed_deposits: Decimal,
    pub completed_withdrawals: Decimal,
    pub pending_count: i64,
}

fn owned_by<'a>(owner: &'a str, filter: &RowFilter) -> transactions::BoxedQuery<'a, Pg> {
    let mut query = transactions::table
        .filter(transactions::owner.eq(owner))
        .into_boxed();

    if !filter.kinds.is_empty() {
        query = query.filter(transactions::kind.eq_any(filter.kinds.clone()));
    }
    if !filter.statuses.is_empty() {
        query = query.filter(transactions::status.eq_any(filter.statuses.clone()));
    }

    query
}

impl TransactionRow {
    pub fn create(new_row: &NewTransactionRow, conn: &mut PgConnection) -> QueryResult<Self> {
        diesel::insert_into(transactions::table)
            .values(new_row)
            .returning(Self::as_returning())
            .get_result(conn)
    }

    pub fn find(id: &str, conn: &mut PgConnection) -> QueryResult<Option<Self>> {
        transactions::table
            .find(id)
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    pub fn find_owned(id: &str, owner: &str, conn: &mut PgConnection) -> QueryResult<Option<Self>> {
        transactions::table
            .find(id)
            .filter(transactions::owner.eq(owner))
            .select(Self::as_select())
            .first(conn)
            .optional()
    }

    /// Newest first. Rows sharing a timestamp keep insertion order reversed.
    pub fn page(
        owner: &str,
        filter: &RowFilter,
        conn: &mut PgConnection,
    ) -> QueryResult<(Vec<Self>, i64)> {
        let total = owned_by(owner, filter).count().get_result::<i64>(conn)?;
        let rows = owned_by(owner, filter)
            .order((transactions::created_at.desc(), transactions::seq.desc()))
            .limit(filter.limit)
            .offset(filter.offset)
            .select(Self::as_select())
            .load(conn)?;

        Ok((rows, total))
    }

    /// Compare-and-set on the status column. The metadata patch is applied in
    /// the same database transaction.
    pub fn transition(
        id: &str,
        from: &str,
        to: &str,
        metadata_patch: Option<&JsonValue>,
        conn: &mut PgConnection,
    ) -> QueryResult<Option<Self>> {
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            let updated = diesel::update(
                transactions::table
                    .find(id)
                    .filter(transactions::status.eq(from)),
            )
            .set((
                transactions::status.eq(to),
                transactions::updated_at.eq(Utc::now()),
            ))
            .returning(Self::as_returning())
            .get_result::<Self>(conn)
            .optional()?;

            let Some(mut row) = updated else {
                return Ok(None);
            };

            if let Some(patch) = metadata_patch {
                merge_metadata(&mut row.metadata, patch);
                row = diesel::update(transactions::table.find(id))
                    .set(transactions::metadata.eq(row.metadata.clone()))
                    .returning(Self::as_returning())
                    .get_result(conn)?;
            }

            Ok(Some(row))
        })
    }

    pub fn find_stale_pending(
        kind: &str,
        payment_method: &str,
        created_before: DateTime<Utc>,
        conn: &mut PgConnection,
    ) -> QueryResult<Vec<Self>> {
        transactions::table
            .filter(transactions::kind.eq(kind))
            .filter(transactions::payment_method.eq(payment_method))
            .filter(transactions::status.eq(TransactionStatus::Pending.as_str()))
            .filter(transactions::created_at.lt(created_before))
            .order(transactions::created_at.asc())
            .select(Self::as_select())
            .load(conn)
    }

    pub fn totals(owner: &str, conn: &mut PgConnection) -> QueryResult<RowTotals> {
        let completed_sum = |kind: &str, conn: &mut PgConnection| -> QueryResult<Decimal> {
            transactions::table
                .filter(transactions::owner.eq(owner))
                .filter(transactions::kind.eq(kind))
                .filter(transactions::status.eq(TransactionStatus::Completed.as_str()))
                .select(sum(transactions::amount))
                .get_result::<Option<Decimal>>(conn)
                .map(Option::unwrap_or_default)
        };

        let completed_deposits = completed_sum(TransactionKind::Deposit.as_str(), conn)?;
        let completed_withdrawals = completed_sum(TransactionKind::Withdrawal.as_str(), conn)?;
        let pending_count = transactions::table
            .filter(transactions::owner.eq(owner))
            .filter(transactions::status.eq(TransactionStatus::Pending.as_str()))
            .count()
            .get_result::<i64>(conn)?;

        Ok(RowTotals {
            completed_deposits,
            completed_withdrawals,
            pending_count,
        })
    }
}

fn decode<T: FromStr>(id: &str, field: &str, value: &str) -> Result<T, DatabaseError> {
    T::from_str(value).map_err(|_| {
        DatabaseError::decode(
            format!("decode transaction {id}"),
            format!("invalid {field} '{value}'"),
        )
    })
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let kind = decode(&row.id, "kind", &row.kind)?;
        let currency = decode(&row.id, "currency", &row.currency)?;
        let status = decode(&row.id, "status", &row.status)?;
        let payment_method = row
            .payment_method
            .as_deref()
            .map(|method| decode(&row.id, "payment method", method))
            .transpose()?;

        Ok(Self {
            id: row.id,
            owner: row.owner,
            kind,
            amount: row.amount,
            currency,
            status,
            payment_method,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurum_types::{Currency, PaymentMethod};
    use rust_decimal::dec;
    use serde_json::json;

    fn row() -> TransactionRow {
        TransactionRow {
            id: "txn_01".to_string(),
            seq: 1,
            owner: "u1".to_string(),
            kind: "deposit".to_string(),
            amount: dec!(120.5),
            currency: "USDT".to_string(),
            status: "pending".to_string(),
            payment_method: Some("crypto".to_string()),
            metadata: json!({ "network": "tron" }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_decodes_into_transaction() {
        let txn = Transaction::try_from(row()).unwrap();
        assert_eq!(txn.kind, TransactionKind::Deposit);
        assert_eq!(txn.currency, Currency::USDT);
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(txn.payment_method, Some(PaymentMethod::Crypto));
        assert_eq!(txn.meta_str("network"), Some("tron"));
    }

    #[test]
    fn test_unknown_status_is_a_decode_error() {
        let err = Transaction::try_from(TransactionRow {
            status: "settled".to_string(),
            ..row()
        })
        .unwrap_err();
        assert!(matches!(err, DatabaseError::DecodeError { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_new_row_uses_storage_names() {
        let new_row = NewTransactionRow::from(NewTransaction {
            id: "txn_02".to_string(),
            owner: "u1".to_string(),
            kind: TransactionKind::Withdrawal,
            amount: dec!(10),
            currency: Currency::USD,
            status: TransactionStatus::Pending,
            payment_method: Some(PaymentMethod::BankTransfer),
            metadata: json!({}),
        });
        assert_eq!(new_row.kind, "withdrawal");
        assert_eq!(new_row.currency, "USD");
        assert_eq!(new_row.payment_method.as_deref(), Some("bank_transfer"));
    }
}
