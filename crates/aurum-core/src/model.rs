use std::collections::HashSet;

use aurum_types::{Currency, PaymentMethod, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use ulid::Ulid;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Metadata keys written by the orchestrator.
pub mod meta {
    pub const WALLET_ADDRESS: &str = "wallet_address";
    pub const NETWORK: &str = "network";
    pub const CRYPTO_ADDRESS: &str = "crypto_address";
    pub const FEE: &str = "fee";
    pub const IS_INITIAL_DEPOSIT: &str = "is_initial_deposit";
    pub const FAILURE_REASON: &str = "failure_reason";
}

/// Generates an opaque transaction identifier.
pub fn new_transaction_id() -> String {
    format!("txn_{}", Ulid::new())
}

/// Ledger reference used when funds of a transaction are given back.
pub fn refund_ref(transaction_id: &str) -> String {
    format!("{transaction_id}:refund")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub owner: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub payment_method: Option<PaymentMethod>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_pending_withdrawal(&self) -> bool {
        self.kind == TransactionKind::Withdrawal && self.status == TransactionStatus::Pending
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(JsonValue::as_str)
    }

    pub fn is_initial_deposit(&self) -> bool {
        self.kind == TransactionKind::Deposit
            && self
                .metadata
                .get(meta::IS_INITIAL_DEPOSIT)
                .and_then(JsonValue::as_bool)
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub id: String,
    pub owner: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub payment_method: Option<PaymentMethod>,
    pub metadata: JsonValue,
}

/// Key/value metadata builder, skipping absent values.
#[derive(Debug, Default)]
pub struct Metadata(Map<String, JsonValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_opt(self, key: &str, value: Option<impl Into<JsonValue>>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.0)
    }
}

/// Merges `patch` into `target`, both expected to be JSON objects.
pub fn merge_metadata(target: &mut JsonValue, patch: &JsonValue) {
    let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub owner: String,
    pub currency: Currency,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub owner: String,
    pub has_initial_deposit: bool,
    pub updated_at: DateTime<Utc>,
}

/// History query. Empty sets mean "no filter".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    pub kinds: HashSet<TransactionKind>,
    pub statuses: HashSet<TransactionStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            kinds: HashSet::new(),
            statuses: HashSet::new(),
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl TransactionFilter {
    pub fn matches(&self, txn: &Transaction) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&txn.kind))
            && (self.statuses.is_empty() || self.statuses.contains(&txn.status))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregates over a user's transactions, computed by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionTotals {
    pub completed_deposits: Decimal,
    pub completed_withdrawals: Decimal,
    pub pending_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub available_balance: Decimal,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub pending_transactions: i64,
    pub has_initial_deposit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepositReceipt {
    pub transaction: Transaction,
    pub deposit_address: Option<String>,
    pub network: Option<String>,
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub is_initial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub wallet_address: String,
    pub network: String,
}

/// Outcome applied by an operator to a pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Completed,
    Failed,
}

impl Resolution {
    pub const fn status(self) -> TransactionStatus {
        match self {
            Self::Completed => TransactionStatus::Completed,
            Self::Failed => TransactionStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_builder_skips_none() {
        let value = Metadata::new()
            .with(meta::NETWORK, "tron")
            .with_opt(meta::FEE, None::<String>)
            .into_value();
        assert_eq!(value, json!({ "network": "tron" }));
    }

    #[test]
    fn test_merge_metadata() {
        let mut target = json!({ "network": "tron", "fee": "1" });
        merge_metadata(&mut target, &json!({ "failure_reason": "expired", "fee": "2" }));
        assert_eq!(
            target,
            json!({ "network": "tron", "fee": "2", "failure_reason": "expired" })
        );
    }

    #[test]
    fn test_transaction_ids_are_prefixed_and_unique() {
        let a = new_transaction_id();
        let b = new_transaction_id();
        assert!(a.starts_with("txn_"));
        assert_ne!(a, b);
        assert_eq!(refund_ref(&a), format!("{a}:refund"));
    }
}
