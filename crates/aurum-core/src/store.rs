use aurum_types::{Currency, PaymentMethod, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::error::UpstreamError;
use crate::model::{
    NewTransaction, Page, Transaction, TransactionFilter, TransactionTotals, UserSettings, Wallet,
};

pub type StoreResult<T> = Result<T, UpstreamError>;

/// Durable record of transactions, wallets and per-user settings.
///
/// Reads that take an `owner` never return another user's records.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_transaction(&self, new: NewTransaction) -> StoreResult<Transaction>;

    async fn find_transaction(&self, owner: &str, id: &str) -> StoreResult<Option<Transaction>>;

    /// Unscoped lookup, reserved for operator flows.
    async fn find_transaction_by_id(&self, id: &str) -> StoreResult<Option<Transaction>>;

    /// Newest first, with the total number of matching rows.
    async fn list_transactions(
        &self,
        owner: &str,
        filter: &TransactionFilter,
    ) -> StoreResult<Page<Transaction>>;

    /// Moves `id` from `from` to `to` only if it is still in `from`, merging
    /// `metadata_patch` into the stored metadata. Returns `None` when the
    /// transaction is missing or no longer in `from`.
    async fn transition_status(
        &self,
        id: &str,
        from: TransactionStatus,
        to: TransactionStatus,
        metadata_patch: Option<JsonValue>,
    ) -> StoreResult<Option<Transaction>>;

    async fn find_stale_pending(
        &self,
        kind: TransactionKind,
        method: PaymentMethod,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>>;

    async fn totals(&self, owner: &str) -> StoreResult<TransactionTotals>;

    async fn upsert_wallet(&self, owner: &str, currency: Currency) -> StoreResult<Wallet>;

    /// Returns the settings record, creating it with `has_initial_deposit = false`.
    async fn get_or_create_settings(&self, owner: &str) -> StoreResult<UserSettings>;

    /// Sets `has_initial_deposit` to `value` only if it currently equals
    /// `expected`. Returns whether the swap happened.
    async fn swap_initial_deposit(
        &self,
        owner: &str,
        expected: bool,
        value: bool,
    ) -> StoreResult<bool>;
}
