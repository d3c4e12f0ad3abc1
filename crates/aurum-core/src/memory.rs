//! Process-local backends, used for development runs and tests.

use std::collections::{HashMap, HashSet};

use aurum_types::{Currency, PaymentMethod, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::error::{LedgerError, UpstreamError};
use crate::ledger::LedgerGateway;
use crate::model::{
    NewTransaction, Page, Transaction, TransactionFilter, TransactionTotals, UserSettings, Wallet,
    merge_metadata,
};
use crate::notify::{Notification, NotificationEmitter};
use crate::store::{StoreResult, TransactionStore};

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    applied: HashSet<String>,
}

/// Ledger keeping balances in memory. Each call runs under one lock, which
/// makes the conditional debit atomic.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a balance outside of any transaction reference.
    pub async fn set_balance(&self, user: &str, amount: Decimal) {
        self.state
            .lock()
            .await
            .balances
            .insert(user.to_string(), amount);
    }
}

#[async_trait::async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn get_balance(&self, user: &str) -> Result<Decimal, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.balances.get(user).copied().unwrap_or_default())
    }

    async fn credit(
        &self,
        user: &str,
        amount: Decimal,
        txn_ref: &str,
    ) -> Result<Decimal, LedgerError> {
        let mut state = self.state.lock().await;
        let LedgerState { balances, applied } = &mut *state;
        let balance = balances.entry(user.to_string()).or_default();

        if applied.insert(txn_ref.to_string()) {
            *balance += amount;
        }

        Ok(*balance)
    }

    async fn reserve_and_debit(
        &self,
        user: &str,
        amount: Decimal,
        txn_ref: &str,
    ) -> Result<Decimal, LedgerError> {
        let mut state = self.state.lock().await;
        let LedgerState { balances, applied } = &mut *state;
        let balance = balances.entry(user.to_string()).or_default();

        if applied.contains(txn_ref) {
            return Ok(*balance);
        }
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: *balance,
            });
        }

        applied.insert(txn_ref.to_string());
        *balance -= amount;
        Ok(*balance)
    }
}

struct StoredTransaction {
    seq: u64,
    txn: Transaction,
}

#[derive(Default)]
struct StoreState {
    seq: u64,
    transactions: HashMap<String, StoredTransaction>,
    wallets: HashMap<(String, Currency), Wallet>,
    settings: HashMap<String, UserSettings>,
}

impl StoreState {
    fn owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a StoredTransaction> {
        self.transactions
            .values()
            .filter(move |stored| stored.txn.owner == owner)
    }

    fn settings_for(&mut self, owner: &str) -> &mut UserSettings {
        self.settings
            .entry(owner.to_string())
            .or_insert_with(|| UserSettings {
                owner: owner.to_string(),
                has_initial_deposit: false,
                updated_at: Utc::now(),
            })
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    pub async fn wallet_count(&self, owner: &str) -> usize {
        let state = self.state.lock().await;
        state.wallets.keys().filter(|(o, _)| o == owner).count()
    }

    /// Rewrites `created_at`, letting tests age a record.
    pub async fn backdate(&self, id: &str, created_at: DateTime<Utc>) {
        if let Some(stored) = self.state.lock().await.transactions.get_mut(id) {
            stored.txn.created_at = created_at;
        }
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
        let mut state = self.state.lock().await;
        if state.transactions.contains_key(&new.id) {
            return Err(UpstreamError::permanent(
                format!("insert transaction {}", new.id),
                "duplicate transaction id",
            ));
        }

        let now = Utc::now();
        let txn = Transaction {
            id: new.id,
            owner: new.owner,
            kind: new.kind,
            amount: new.amount,
            currency: new.currency,
            status: new.status,
            payment_method: new.payment_method,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        state.seq += 1;
        let seq = state.seq;
        state.transactions.insert(
            txn.id.clone(),
            StoredTransaction {
                seq,
                txn: txn.clone(),
            },
        );
        Ok(txn)
    }

    async fn find_transaction(&self, owner: &str, id: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .get(id)
            .filter(|stored| stored.txn.owner == owner)
            .map(|stored| stored.txn.clone()))
    }

    async fn find_transaction_by_id(&self, id: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state.transactions.get(id).map(|stored| stored.txn.clone()))
    }

    async fn list_transactions(
        &self,
        owner: &str,
        filter: &TransactionFilter,
    ) -> StoreResult<Page<Transaction>> {
        let state = self.state.lock().await;
        let mut matching: Vec<&StoredTransaction> = state
            .owned_by(owner)
            .filter(|stored| filter.matches(&stored.txn))
            .collect();

        matching.sort_by(|a, b| {
            b.txn
                .created_at
                .cmp(&a.txn.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .map(|stored| stored.txn.clone())
            .collect();

        Ok(Page {
            items,
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
        let mut state = self.state.lock().await;
        let Some(stored) = state.transactions.get_mut(id) else {
            return Ok(None);
        };
        if stored.txn.status != from {
            return Ok(None);
        }

        stored.txn.status = to;
        stored.txn.updated_at = Utc::now();
        if let Some(patch) = metadata_patch {
            merge_metadata(&mut stored.txn.metadata, &patch);
        }
        Ok(Some(stored.txn.clone()))
    }

    async fn find_stale_pending(
        &self,
        kind: TransactionKind,
        method: PaymentMethod,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .map(|stored| &stored.txn)
            .filter(|txn| {
                txn.kind == kind
                    && txn.payment_method == Some(method)
                    && txn.status == TransactionStatus::Pending
                    && txn.created_at < created_before
            })
            .cloned()
            .collect())
    }

    async fn totals(&self, owner: &str) -> StoreResult<TransactionTotals> {
        let state = self.state.lock().await;
        let mut totals = TransactionTotals::default();
        for StoredTransaction { txn, .. } in state.owned_by(owner) {
            match (txn.kind, txn.status) {
                (_, TransactionStatus::Pending) => totals.pending_count += 1,
                (TransactionKind::Deposit, TransactionStatus::Completed) => {
                    totals.completed_deposits += txn.amount;
                }
                (TransactionKind::Withdrawal, TransactionStatus::Completed) => {
                    totals.completed_withdrawals += txn.amount;
                }
                _ => {}
            }
        }
        Ok(totals)
    }

    async fn upsert_wallet(&self, owner: &str, currency: Currency) -> StoreResult<Wallet> {
        let mut state = self.state.lock().await;
        let wallet = state
            .wallets
            .entry((owner.to_string(), currency))
            .or_insert_with(|| Wallet {
                owner: owner.to_string(),
                currency,
                is_active: true,
                created_at: Utc::now(),
            });
        wallet.is_active = true;
        Ok(wallet.clone())
    }

    async fn get_or_create_settings(&self, owner: &str) -> StoreResult<UserSettings> {
        let mut state = self.state.lock().await;
        Ok(state.settings_for(owner).clone())
    }

    async fn swap_initial_deposit(
        &self,
        owner: &str,
        expected: bool,
        value: bool,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let settings = state.settings_for(owner);
        if settings.has_initial_deposit != expected {
            return Ok(false);
        }
        settings.has_initial_deposit = value;
        settings.updated_at = Utc::now();
        Ok(true)
    }
}

/// Keeps every emitted notification, for inspection.
#[derive(Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl NotificationEmitter for InMemoryNotifier {
    async fn emit(&self, notification: Notification) -> Result<(), UpstreamError> {
        self.sent.lock().await.push(notification);
        Ok(())
    }
}
