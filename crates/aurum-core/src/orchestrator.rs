use std::sync::Arc;

use aurum_types::{PaymentMethod, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::DepositPolicy;
use crate::error::{CoreError, CoreResult, PolicyViolation};
use crate::feed::{ChangeEvent, ChangeFeed};
use crate::ledger::LedgerGateway;
use crate::model::{
    AccountSummary, DepositReceipt, DepositRequest, MAX_PAGE_LIMIT, Metadata, NewTransaction,
    Page, Resolution, Transaction, TransactionFilter, WithdrawalRequest, meta,
    new_transaction_id, refund_ref,
};
use crate::notify::{Notification, NotificationEmitter, NotificationKind};
use crate::store::TransactionStore;

/// Sequences deposits, withdrawals and status changes across the store and
/// the ledger. Holds no balance or status state of its own.
#[derive(Clone)]
pub struct TransactionOrchestrator {
    store: Arc<dyn TransactionStore>,
    ledger: Arc<dyn LedgerGateway>,
    notifier: Arc<dyn NotificationEmitter>,
    feed: ChangeFeed,
    policy: DepositPolicy,
}

impl TransactionOrchestrator {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        ledger: Arc<dyn LedgerGateway>,
        notifier: Arc<dyn NotificationEmitter>,
        feed: ChangeFeed,
        policy: DepositPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            feed,
            policy,
        }
    }

    pub const fn policy(&self) -> &DepositPolicy {
        &self.policy
    }

    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub async fn process_deposit(
        &self,
        user: &str,
        request: DepositRequest,
    ) -> CoreResult<DepositReceipt> {
        let DepositRequest {
            amount,
            currency,
            method,
            is_initial,
        } = request;

        let minimum = self.policy.minimum(is_initial);
        if amount < minimum {
            let label = if is_initial { "initial deposit" } else { "deposit" };
            return Err(CoreError::validation(format!(
                "Minimum {label} amount is {minimum}"
            )));
        }
        if !self.policy.allowed_methods.contains(&method) {
            return Err(CoreError::validation(format!(
                "Payment method {method} is not accepted"
            )));
        }
        let crypto_address = if method.requires_confirmation() {
            let address = self.policy.crypto_address(currency).ok_or_else(|| {
                CoreError::validation(format!("No deposit address configured for {currency}"))
            })?;
            Some(address.clone())
        } else {
            None
        };

        if is_initial && self.store.get_or_create_settings(user).await?.has_initial_deposit {
            return Err(PolicyViolation::DuplicateInitialDeposit.into());
        }

        self.store.upsert_wallet(user, currency).await?;

        // The one-time flag is claimed before funds move, so two concurrent
        // initial deposits cannot both complete. Crypto claims on confirmation.
        let claimed = is_initial && !method.requires_confirmation();
        if claimed && !self.store.swap_initial_deposit(user, false, true).await? {
            return Err(PolicyViolation::DuplicateInitialDeposit.into());
        }

        let id = new_transaction_id();
        let metadata = Metadata::new()
            .with(meta::IS_INITIAL_DEPOSIT, is_initial)
            .with_opt(
                meta::CRYPTO_ADDRESS,
                crypto_address.as_ref().map(|a| a.address.clone()),
            )
            .with_opt(
                meta::NETWORK,
                crypto_address.as_ref().map(|a| a.network.clone()),
            )
            .into_value();

        let new_transaction = NewTransaction {
            id: id.clone(),
            owner: user.to_string(),
            kind: TransactionKind::Deposit,
            amount,
            currency,
            status: TransactionStatus::Pending,
            payment_method: Some(method),
            metadata,
        };

        let pending = match self.store.insert_transaction(new_transaction).await {
            Ok(txn) => txn,
            Err(err) => {
                if claimed {
                    self.release_initial_claim(user).await;
                }
                return Err(err.into());
            }
        };

        if let Some(address) = crypto_address {
            info!(
                user,
                transaction_id = %pending.id,
                %amount,
                %currency,
                network = %address.network,
                "Crypto deposit awaiting confirmation",
            );
            self.publish(&pending);
            self.notify(Notification::new(
                user,
                NotificationKind::DepositPending,
                "Deposit pending",
                format!(
                    "Send {amount} {currency} to {} on {} to complete your deposit",
                    address.address, address.network
                ),
            ))
            .await;

            return Ok(DepositReceipt {
                transaction: pending,
                deposit_address: Some(address.address),
                network: Some(address.network),
                requires_confirmation: true,
            });
        }

        if let Err(err) = self.ledger.commit_deposit(user, amount, method, &id).await {
            error!(
                user,
                transaction_id = %id,
                error = %err,
                "Ledger rejected deposit credit",
            );
            if claimed {
                self.release_initial_claim(user).await;
            }
            self.fail_transaction(&pending, "ledger_unavailable").await;
            return Err(CoreError::from(err).for_transaction(&id));
        }

        let completed = self
            .store
            .transition_status(
                &id,
                TransactionStatus::Pending,
                TransactionStatus::Completed,
                None,
            )
            .await
            .map_err(|err| CoreError::from(err).for_transaction(&id))?
            .ok_or_else(|| {
                CoreError::InvalidState(format!("Transaction {id} changed state while completing"))
            })?;

        info!(
            user,
            transaction_id = %completed.id,
            %amount,
            %currency,
            method = method.as_str(),
            is_initial,
            "Deposit completed",
        );
        self.publish(&completed);
        self.notify(Notification::new(
            user,
            NotificationKind::DepositCompleted,
            "Deposit completed",
            format!("Your deposit of {amount} {currency} has been credited"),
        ))
        .await;

        Ok(DepositReceipt {
            transaction: completed,
            deposit_address: None,
            network: None,
            requires_confirmation: false,
        })
    }

    pub async fn create_withdrawal_request(
        &self,
        user: &str,
        request: WithdrawalRequest,
    ) -> CoreResult<Transaction> {
        let WithdrawalRequest {
            amount,
            wallet_address,
            network,
        } = request;

        if amount <= Decimal::ZERO {
            return Err(CoreError::validation("Amount must be strictly positive"));
        }
        let wallet_address = wallet_address.trim();
        if wallet_address.is_empty() {
            return Err(CoreError::validation("Wallet address is required"));
        }
        let network = network.trim();
        if network.is_empty() {
            return Err(CoreError::validation("Network is required"));
        }

        // Fast rejection only, the debit below is the authoritative check.
        let available = self.ledger.get_balance(user).await?;
        if amount > available {
            info!(user, %amount, %available, "Withdrawal rejected, insufficient balance");
            return Err(PolicyViolation::InsufficientBalance.into());
        }

        let id = new_transaction_id();
        self.ledger.reserve_and_debit(user, amount, &id).await?;

        let new_transaction = NewTransaction {
            id: id.clone(),
            owner: user.to_string(),
            kind: TransactionKind::Withdrawal,
            amount,
            currency: self.policy.settlement_currency,
            status: TransactionStatus::Pending,
            payment_method: None,
            metadata: Metadata::new()
                .with(meta::WALLET_ADDRESS, wallet_address)
                .with(meta::NETWORK, network)
                .into_value(),
        };

        let txn = match self.store.insert_transaction(new_transaction).await {
            Ok(txn) => txn,
            Err(err) => {
                if let Err(refund_err) = self.ledger.credit(user, amount, &refund_ref(&id)).await {
                    error!(
                        user,
                        transaction_id = %id,
                        error = %refund_err,
                        "Failed to release reserved funds after store failure",
                    );
                }
                return Err(err.into());
            }
        };

        info!(
            user,
            transaction_id = %txn.id,
            %amount,
            network,
            "Withdrawal requested",
        );
        self.publish(&txn);
        self.notify(Notification::new(
            user,
            NotificationKind::WithdrawalRequested,
            "Withdrawal requested",
            format!("Your withdrawal of {amount} {} is being processed", txn.currency),
        ))
        .await;

        Ok(txn)
    }

    pub async fn cancel_withdrawal_request(&self, user: &str, id: &str) -> CoreResult<Transaction> {
        let txn = self
            .store
            .find_transaction(user, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Transaction {id} not found")))?;

        if txn.kind == TransactionKind::Withdrawal && txn.status == TransactionStatus::Cancelled {
            // A refund that failed after the status was written is retried
            // here. The ledger ignores the reference if it was already applied.
            self.refund_cancelled(&txn).await?;
        }
        if !txn.is_pending_withdrawal() {
            return Err(CoreError::InvalidState(format!(
                "Transaction {id} is not a pending withdrawal"
            )));
        }

        let cancelled = self
            .store
            .transition_status(
                id,
                TransactionStatus::Pending,
                TransactionStatus::Cancelled,
                None,
            )
            .await?
            .ok_or_else(|| {
                CoreError::InvalidState(format!("Transaction {id} is not a pending withdrawal"))
            })?;

        self.refund_cancelled(&cancelled).await?;

        info!(user, transaction_id = %id, amount = %cancelled.amount, "Withdrawal cancelled");
        self.publish(&cancelled);
        self.notify(Notification::new(
            user,
            NotificationKind::WithdrawalCancelled,
            "Withdrawal cancelled",
            format!(
                "Your withdrawal of {} {} was cancelled and refunded",
                cancelled.amount, cancelled.currency
            ),
        ))
        .await;

        Ok(cancelled)
    }

    pub async fn get_transaction_history(
        &self,
        user: &str,
        filter: TransactionFilter,
    ) -> CoreResult<Page<Transaction>> {
        if !(1..=MAX_PAGE_LIMIT).contains(&filter.limit) {
            return Err(CoreError::validation(format!(
                "Limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        if filter.offset < 0 {
            return Err(CoreError::validation("Offset must be non-negative"));
        }

        Ok(self.store.list_transactions(user, &filter).await?)
    }

    pub async fn get_transaction_details(&self, user: &str, id: &str) -> CoreResult<Transaction> {
        self.store
            .find_transaction(user, id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Transaction {id} not found")))
    }

    /// Applies an operator decision to a pending deposit or withdrawal.
    ///
    /// Resolving a transaction that already carries the requested status
    /// replays the funds movement, which the ledger deduplicates. This is the
    /// retry path when the ledger failed after the status was written.
    pub async fn resolve_pending(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> CoreResult<Transaction> {
        let txn = self
            .store
            .find_transaction_by_id(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Transaction {id} not found")))?;

        if !matches!(
            txn.kind,
            TransactionKind::Deposit | TransactionKind::Withdrawal
        ) {
            return Err(CoreError::validation(format!(
                "Only deposits and withdrawals can be resolved, got {}",
                txn.kind
            )));
        }

        let target = resolution.status();
        let resolved = if txn.status == target {
            debug!(transaction_id = %id, status = %target, "Replaying resolution");
            txn
        } else if txn.status.can_transition_to(target) {
            // Crypto initial deposits claim the one-time flag when confirmed.
            let claims_initial = txn.kind == TransactionKind::Deposit
                && target == TransactionStatus::Completed
                && txn.is_initial_deposit();
            if claims_initial
                && !self
                    .store
                    .swap_initial_deposit(&txn.owner, false, true)
                    .await?
            {
                warn!(
                    user = %txn.owner,
                    transaction_id = %id,
                    "Initial deposit already processed, failing duplicate",
                );
                self.fail_transaction(&txn, "duplicate_initial_deposit").await;
                return Err(PolicyViolation::DuplicateInitialDeposit.into());
            }

            match self
                .store
                .transition_status(id, TransactionStatus::Pending, target, None)
                .await
            {
                Ok(Some(resolved)) => resolved,
                outcome => {
                    if claims_initial {
                        self.release_initial_claim(&txn.owner).await;
                    }
                    return Err(match outcome {
                        Err(err) => err.into(),
                        _ => CoreError::InvalidState(format!(
                            "Transaction {id} is no longer pending"
                        )),
                    });
                }
            }
        } else {
            return Err(CoreError::InvalidState(format!(
                "Transaction {id} is already {}",
                txn.status
            )));
        };

        self.apply_resolution(&resolved)
            .await
            .map_err(|err| err.for_transaction(id))?;

        info!(
            user = %resolved.owner,
            transaction_id = %id,
            kind = %resolved.kind,
            status = %resolved.status,
            "Transaction resolved",
        );
        self.publish(&resolved);
        if let Some(notification) = resolution_notification(&resolved) {
            self.notify(notification).await;
        }

        Ok(resolved)
    }

    pub async fn account_summary(&self, user: &str) -> CoreResult<AccountSummary> {
        let (available_balance, totals, settings) = tokio::try_join!(
            async { self.ledger.get_balance(user).await.map_err(CoreError::from) },
            async { self.store.totals(user).await.map_err(CoreError::from) },
            async {
                self.store
                    .get_or_create_settings(user)
                    .await
                    .map_err(CoreError::from)
            },
        )?;

        Ok(AccountSummary {
            available_balance,
            total_deposits: totals.completed_deposits,
            total_withdrawals: totals.completed_withdrawals,
            pending_transactions: totals.pending_count,
            has_initial_deposit: settings.has_initial_deposit,
        })
    }

    /// Fails pending crypto deposits created before `cutoff`. Returns how many
    /// were expired.
    pub async fn expire_stale_crypto_deposits(&self, cutoff: DateTime<Utc>) -> CoreResult<usize> {
        let stale = self
            .store
            .find_stale_pending(TransactionKind::Deposit, PaymentMethod::Crypto, cutoff)
            .await?;

        let mut expired = 0;
        for txn in stale {
            match self
                .store
                .transition_status(
                    &txn.id,
                    TransactionStatus::Pending,
                    TransactionStatus::Failed,
                    Some(json!({ meta::FAILURE_REASON: "expired" })),
                )
                .await
            {
                Ok(Some(failed)) => {
                    expired += 1;
                    self.publish(&failed);
                    self.notify(Notification::new(
                        &failed.owner,
                        NotificationKind::DepositFailed,
                        "Deposit expired",
                        format!(
                            "No funds were received for your {} {} deposit",
                            failed.amount, failed.currency
                        ),
                    ))
                    .await;
                }
                Ok(None) => debug!(transaction_id = %txn.id, "Deposit resolved before expiry"),
                Err(err) => warn!(
                    transaction_id = %txn.id,
                    error = %err,
                    "Failed to expire stale crypto deposit",
                ),
            }
        }

        Ok(expired)
    }

    async fn apply_resolution(&self, txn: &Transaction) -> CoreResult<()> {
        match (txn.kind, txn.status) {
            (TransactionKind::Deposit, TransactionStatus::Completed) => {
                let method = txn.payment_method.unwrap_or(PaymentMethod::Crypto);
                self.ledger
                    .commit_deposit(&txn.owner, txn.amount, method, &txn.id)
                    .await?;
            }
            (TransactionKind::Withdrawal, TransactionStatus::Failed) => {
                self.ledger
                    .credit(&txn.owner, txn.amount, &refund_ref(&txn.id))
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn refund_cancelled(&self, txn: &Transaction) -> CoreResult<()> {
        if txn.amount <= Decimal::ZERO {
            return Ok(());
        }
        self.ledger
            .credit(&txn.owner, txn.amount, &refund_ref(&txn.id))
            .await
            .map_err(|err| {
                error!(
                    user = %txn.owner,
                    transaction_id = %txn.id,
                    error = %err,
                    "Refund of cancelled withdrawal failed, cancel again to retry",
                );
                CoreError::from(err).for_transaction(&txn.id)
            })?;
        Ok(())
    }

    async fn fail_transaction(&self, txn: &Transaction, reason: &str) {
        match self
            .store
            .transition_status(
                &txn.id,
                TransactionStatus::Pending,
                TransactionStatus::Failed,
                Some(json!({ meta::FAILURE_REASON: reason })),
            )
            .await
        {
            Ok(Some(failed)) => self.publish(&failed),
            Ok(None) => warn!(
                transaction_id = %txn.id,
                "Transaction left pending state before failing",
            ),
            Err(err) => error!(
                transaction_id = %txn.id,
                error = %err,
                "Could not mark transaction as failed",
            ),
        }
    }

    async fn release_initial_claim(&self, user: &str) {
        if let Err(err) = self.store.swap_initial_deposit(user, true, false).await {
            error!(user, error = %err, "Could not release initial deposit claim");
        }
    }

    fn publish(&self, txn: &Transaction) {
        let delivered = self.feed.publish(ChangeEvent::from(txn));
        debug!(transaction_id = %txn.id, delivered, "Change event published");
    }

    async fn notify(&self, notification: Notification) {
        let kind = notification.kind;
        if let Err(err) = self.notifier.emit(notification).await {
            warn!(%kind, error = %err, "Failed to emit notification");
        }
    }
}

fn resolution_notification(txn: &Transaction) -> Option<Notification> {
    let (kind, title) = match (txn.kind, txn.status) {
        (TransactionKind::Deposit, TransactionStatus::Completed) => {
            (NotificationKind::DepositCompleted, "Deposit completed")
        }
        (TransactionKind::Deposit, TransactionStatus::Failed) => {
            (NotificationKind::DepositFailed, "Deposit failed")
        }
        (TransactionKind::Withdrawal, TransactionStatus::Completed) => {
            (NotificationKind::WithdrawalCompleted, "Withdrawal completed")
        }
        (TransactionKind::Withdrawal, TransactionStatus::Failed) => {
            (NotificationKind::WithdrawalFailed, "Withdrawal failed")
        }
        _ => return None,
    };

    Some(Notification::new(
        &txn.owner,
        kind,
        title,
        format!("{} {} {} is now {}", txn.kind, txn.amount, txn.currency, txn.status),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use aurum_types::Currency;
    use rust_decimal::dec;
    use serde_json::Value as JsonValue;

    use super::*;
    use crate::config::CryptoDepositAddress;
    use crate::error::{LedgerError, UpstreamError};
    use crate::memory::{InMemoryLedger, InMemoryNotifier, InMemoryStore};
    use crate::model::{TransactionTotals, UserSettings, Wallet};
    use crate::store::StoreResult;

    /// Ledger whose credits can be switched off.
    #[derive(Default)]
    struct FlakyLedger {
        inner: InMemoryLedger,
        fail_credits: AtomicBool,
    }

    #[async_trait::async_trait]
    impl LedgerGateway for FlakyLedger {
        async fn get_balance(&self, user: &str) -> Result<Decimal, LedgerError> {
            self.inner.get_balance(user).await
        }

        async fn credit(
            &self,
            user: &str,
            amount: Decimal,
            txn_ref: &str,
        ) -> Result<Decimal, LedgerError> {
            if self.fail_credits.load(Ordering::SeqCst) {
                return Err(UpstreamError::new("credit", "ledger offline").into());
            }
            self.inner.credit(user, amount, txn_ref).await
        }

        async fn reserve_and_debit(
            &self,
            user: &str,
            amount: Decimal,
            txn_ref: &str,
        ) -> Result<Decimal, LedgerError> {
            self.inner.reserve_and_debit(user, amount, txn_ref).await
        }
    }

    struct Harness {
        orchestrator: TransactionOrchestrator,
        store: Arc<InMemoryStore>,
        ledger: Arc<FlakyLedger>,
        notifier: Arc<InMemoryNotifier>,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let ledger = Arc::new(FlakyLedger::default());
            let notifier = Arc::new(InMemoryNotifier::new());
            let policy = DepositPolicy::default().with_crypto_addresses([CryptoDepositAddress {
                currency: Currency::USDT,
                network: "tron".to_string(),
                address: "TXdeposit".to_string(),
            }]);
            let orchestrator = TransactionOrchestrator::new(
                store.clone(),
                ledger.clone(),
                notifier.clone(),
                ChangeFeed::default(),
                policy,
            );
            Self {
                orchestrator,
                store,
                ledger,
                notifier,
            }
        }

        async fn balance(&self, user: &str) -> Decimal {
            self.ledger.get_balance(user).await.unwrap()
        }

        async fn deposit(&self, user: &str, amount: Decimal) -> DepositReceipt {
            self.orchestrator
                .process_deposit(user, bank_deposit(amount, false))
                .await
                .unwrap()
        }

        async fn withdraw(&self, user: &str, amount: Decimal) -> CoreResult<Transaction> {
            self.orchestrator
                .create_withdrawal_request(
                    user,
                    WithdrawalRequest {
                        amount,
                        wallet_address: "0xabc".to_string(),
                        network: "ethereum".to_string(),
                    },
                )
                .await
        }
    }

    fn bank_deposit(amount: Decimal, is_initial: bool) -> DepositRequest {
        DepositRequest {
            amount,
            currency: Currency::USD,
            method: PaymentMethod::BankTransfer,
            is_initial,
        }
    }

    fn crypto_deposit(amount: Decimal, is_initial: bool) -> DepositRequest {
        DepositRequest {
            amount,
            currency: Currency::USDT,
            method: PaymentMethod::Crypto,
            is_initial,
        }
    }

    #[tokio::test]
    async fn test_deposit_below_minimum_creates_nothing() {
        let h = Harness::new();

        for (amount, is_initial) in [(dec!(9.99), false), (dec!(49.99), true), (dec!(0), false)] {
            let err = h
                .orchestrator
                .process_deposit("u1", bank_deposit(amount, is_initial))
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)), "{err:?}");
        }

        assert_eq!(h.store.transaction_count().await, 0);
        assert_eq!(h.balance("u1").await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_deposit_rejects_disallowed_method_and_unknown_crypto_currency() {
        let mut h = Harness::new();

        let err = h
            .orchestrator
            .process_deposit(
                "u1",
                DepositRequest {
                    currency: Currency::BTC,
                    ..crypto_deposit(dec!(100), false)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let mut policy = h.orchestrator.policy().clone();
        policy.allowed_methods.remove(&PaymentMethod::CreditCard);
        h.orchestrator = TransactionOrchestrator::new(
            h.store.clone(),
            h.ledger.clone(),
            h.notifier.clone(),
            ChangeFeed::default(),
            policy,
        );
        let err = h
            .orchestrator
            .process_deposit(
                "u1",
                DepositRequest {
                    method: PaymentMethod::CreditCard,
                    ..bank_deposit(dec!(100), false)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(h.store.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_completed_deposit_credits_exact_amount() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(100)).await;

        let receipt = h.deposit("u1", dec!(50)).await;

        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        assert_eq!(receipt.transaction.kind, TransactionKind::Deposit);
        assert!(!receipt.requires_confirmation);
        assert!(receipt.deposit_address.is_none());
        assert_eq!(h.balance("u1").await, dec!(150));
        assert_eq!(h.store.wallet_count("u1").await, 1);

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::DepositCompleted);
    }

    #[tokio::test]
    async fn test_concrete_scenario_deposit_then_oversized_withdrawal() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(100)).await;

        let receipt = h.deposit("u1", dec!(50)).await;
        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        assert_eq!(h.balance("u1").await, dec!(150));

        let err = h.withdraw("u1", dec!(200)).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Policy(PolicyViolation::InsufficientBalance)
        ));
        assert_eq!(h.balance("u1").await, dec!(150));
        assert_eq!(h.store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_initial_deposit_succeeds_exactly_once() {
        let h = Harness::new();

        let first = h
            .orchestrator
            .process_deposit("u1", bank_deposit(dec!(50), true))
            .await
            .unwrap();
        assert!(first.transaction.is_initial_deposit());
        assert!(
            h.store
                .get_or_create_settings("u1")
                .await
                .unwrap()
                .has_initial_deposit
        );

        let err = h
            .orchestrator
            .process_deposit("u1", bank_deposit(dec!(75), true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Policy(PolicyViolation::DuplicateInitialDeposit)
        ));
        assert_eq!(h.balance("u1").await, dec!(50));
        assert_eq!(h.store.transaction_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initial_deposits_only_one_wins() {
        let h = Arc::new(Harness::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move {
                    h.orchestrator
                        .process_deposit("u1", bank_deposit(dec!(60), true))
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(
                    err,
                    CoreError::Policy(PolicyViolation::DuplicateInitialDeposit)
                )),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(h.balance("u1").await, dec!(60));
    }

    #[tokio::test]
    async fn test_crypto_deposit_stays_pending_until_resolved() {
        let h = Harness::new();

        let receipt = h
            .orchestrator
            .process_deposit("u1", crypto_deposit(dec!(80), true))
            .await
            .unwrap();
        assert_eq!(receipt.transaction.status, TransactionStatus::Pending);
        assert!(receipt.requires_confirmation);
        assert_eq!(receipt.deposit_address.as_deref(), Some("TXdeposit"));
        assert_eq!(receipt.network.as_deref(), Some("tron"));
        assert_eq!(
            receipt.transaction.meta_str(meta::CRYPTO_ADDRESS),
            Some("TXdeposit")
        );
        assert_eq!(h.balance("u1").await, Decimal::ZERO);
        assert!(
            !h.store
                .get_or_create_settings("u1")
                .await
                .unwrap()
                .has_initial_deposit
        );

        let resolved = h
            .orchestrator
            .resolve_pending(&receipt.transaction.id, Resolution::Completed)
            .await
            .unwrap();
        assert_eq!(resolved.status, TransactionStatus::Completed);
        assert_eq!(h.balance("u1").await, dec!(80));
        assert!(
            h.store
                .get_or_create_settings("u1")
                .await
                .unwrap()
                .has_initial_deposit
        );

        // replaying the resolution never credits twice
        h.orchestrator
            .resolve_pending(&receipt.transaction.id, Resolution::Completed)
            .await
            .unwrap();
        assert_eq!(h.balance("u1").await, dec!(80));

        let err = h
            .orchestrator
            .resolve_pending(&receipt.transaction.id, Resolution::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_second_crypto_initial_deposit_fails_on_confirmation() {
        let h = Harness::new();
        let first = h
            .orchestrator
            .process_deposit("u1", crypto_deposit(dec!(60), true))
            .await
            .unwrap()
            .transaction;
        let second = h
            .orchestrator
            .process_deposit("u1", crypto_deposit(dec!(60), true))
            .await
            .unwrap()
            .transaction;

        h.orchestrator
            .resolve_pending(&first.id, Resolution::Completed)
            .await
            .unwrap();
        let err = h
            .orchestrator
            .resolve_pending(&second.id, Resolution::Completed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Policy(PolicyViolation::DuplicateInitialDeposit)
        ));
        assert_eq!(h.balance("u1").await, dec!(60));

        let second = h
            .orchestrator
            .get_transaction_details("u1", &second.id)
            .await
            .unwrap();
        assert_eq!(second.status, TransactionStatus::Failed);
        assert_eq!(
            second.meta_str(meta::FAILURE_REASON),
            Some("duplicate_initial_deposit")
        );

        // a bank initial deposit is refused once a crypto one completed
        let err = h
            .orchestrator
            .process_deposit("u1", bank_deposit(dec!(60), true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Policy(PolicyViolation::DuplicateInitialDeposit)
        ));
        assert_eq!(h.balance("u1").await, dec!(60));
    }

    #[tokio::test]
    async fn test_failed_crypto_initial_deposit_keeps_flag_clear() {
        let h = Harness::new();
        let pending = h
            .orchestrator
            .process_deposit("u1", crypto_deposit(dec!(60), true))
            .await
            .unwrap()
            .transaction;

        h.orchestrator
            .resolve_pending(&pending.id, Resolution::Failed)
            .await
            .unwrap();
        assert!(
            !h.store
                .get_or_create_settings("u1")
                .await
                .unwrap()
                .has_initial_deposit
        );

        h.orchestrator
            .process_deposit("u1", bank_deposit(dec!(60), true))
            .await
            .unwrap();
        assert_eq!(h.balance("u1").await, dec!(60));
    }

    #[tokio::test]
    async fn test_withdrawal_over_balance_creates_nothing() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(20)).await;

        let err = h.withdraw("u1", dec!(20.01)).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Policy(PolicyViolation::InsufficientBalance)
        ));
        assert_eq!(h.store.transaction_count().await, 0);
        assert_eq!(h.balance("u1").await, dec!(20));
    }

    #[tokio::test]
    async fn test_withdrawal_validation() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(20)).await;

        assert!(matches!(
            h.withdraw("u1", dec!(0)).await.unwrap_err(),
            CoreError::Validation(_)
        ));
        let err = h
            .orchestrator
            .create_withdrawal_request(
                "u1",
                WithdrawalRequest {
                    amount: dec!(5),
                    wallet_address: "   ".to_string(),
                    network: "ethereum".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let h = Arc::new(Harness::new());
        h.ledger.inner.set_balance("u1", dec!(100)).await;

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let h = h.clone();
                tokio::spawn(async move { h.withdraw("u1", dec!(40)).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 2);
        assert_eq!(h.balance("u1").await, dec!(20));
        assert_eq!(h.store.transaction_count().await, 2);
    }

    #[tokio::test]
    async fn test_cancel_twice_refunds_once() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(100)).await;

        let withdrawal = h.withdraw("u1", dec!(30)).await.unwrap();
        assert_eq!(withdrawal.status, TransactionStatus::Pending);
        assert_eq!(h.balance("u1").await, dec!(70));

        let cancelled = h
            .orchestrator
            .cancel_withdrawal_request("u1", &withdrawal.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
        assert_eq!(h.balance("u1").await, dec!(100));

        let err = h
            .orchestrator
            .cancel_withdrawal_request("u1", &withdrawal.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(h.balance("u1").await, dec!(100));
    }

    #[tokio::test]
    async fn test_cancel_retries_refund_after_ledger_failure() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(100)).await;
        let withdrawal = h.withdraw("u1", dec!(30)).await.unwrap();

        h.ledger.fail_credits.store(true, Ordering::SeqCst);
        let err = h
            .orchestrator
            .cancel_withdrawal_request("u1", &withdrawal.id)
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        let stored = h
            .orchestrator
            .get_transaction_details("u1", &withdrawal.id)
            .await
            .unwrap();
        assert_eq!(stored.status, TransactionStatus::Cancelled);
        assert_eq!(h.balance("u1").await, dec!(70));

        // cancelling again still reports the state but applies the refund
        h.ledger.fail_credits.store(false, Ordering::SeqCst);
        let err = h
            .orchestrator
            .cancel_withdrawal_request("u1", &withdrawal.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
        assert_eq!(h.balance("u1").await, dec!(100));

        h.orchestrator
            .cancel_withdrawal_request("u1", &withdrawal.id)
            .await
            .unwrap_err();
        assert_eq!(h.balance("u1").await, dec!(100));
    }

    /// Store that loses every withdrawal it is asked to persist.
    struct WithdrawalRejectingStore {
        inner: InMemoryStore,
    }

    #[async_trait::async_trait]
    impl TransactionStore for WithdrawalRejectingStore {
        async fn insert_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
            if new.kind == TransactionKind::Withdrawal {
                return Err(UpstreamError::new("insert_transaction", "connection reset"));
            }
            self.inner.insert_transaction(new).await
        }

        async fn find_transaction(
            &self,
            owner: &str,
            id: &str,
        ) -> StoreResult<Option<Transaction>> {
            self.inner.find_transaction(owner, id).await
        }

        async fn find_transaction_by_id(&self, id: &str) -> StoreResult<Option<Transaction>> {
            self.inner.find_transaction_by_id(id).await
        }

        async fn list_transactions(
            &self,
            owner: &str,
            filter: &TransactionFilter,
        ) -> StoreResult<Page<Transaction>> {
            self.inner.list_transactions(owner, filter).await
        }

        async fn transition_status(
            &self,
            id: &str,
            from: TransactionStatus,
            to: TransactionStatus,
            metadata_patch: Option<JsonValue>,
        ) -> StoreResult<Option<Transaction>> {
            self.inner
                .transition_status(id, from, to, metadata_patch)
                .await
        }

        async fn find_stale_pending(
            &self,
            kind: TransactionKind,
            method: PaymentMethod,
            created_before: DateTime<Utc>,
        ) -> StoreResult<Vec<Transaction>> {
            self.inner
                .find_stale_pending(kind, method, created_before)
                .await
        }

        async fn totals(&self, owner: &str) -> StoreResult<TransactionTotals> {
            self.inner.totals(owner).await
        }

        async fn upsert_wallet(&self, owner: &str, currency: Currency) -> StoreResult<Wallet> {
            self.inner.upsert_wallet(owner, currency).await
        }

        async fn get_or_create_settings(&self, owner: &str) -> StoreResult<UserSettings> {
            self.inner.get_or_create_settings(owner).await
        }

        async fn swap_initial_deposit(
            &self,
            owner: &str,
            expected: bool,
            value: bool,
        ) -> StoreResult<bool> {
            self.inner.swap_initial_deposit(owner, expected, value).await
        }
    }

    #[tokio::test]
    async fn test_withdrawal_store_failure_releases_reserved_funds() {
        let store = Arc::new(WithdrawalRejectingStore {
            inner: InMemoryStore::new(),
        });
        let ledger = Arc::new(InMemoryLedger::new());
        let orchestrator = TransactionOrchestrator::new(
            store.clone(),
            ledger.clone(),
            Arc::new(InMemoryNotifier::new()),
            ChangeFeed::default(),
            DepositPolicy::default(),
        );
        ledger.set_balance("u1", dec!(100)).await;

        let err = orchestrator
            .create_withdrawal_request(
                "u1",
                WithdrawalRequest {
                    amount: dec!(40),
                    wallet_address: "0xabc".to_string(),
                    network: "ethereum".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(ledger.get_balance("u1").await.unwrap(), dec!(100));
        assert_eq!(store.inner.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_rejects_foreign_and_non_withdrawal() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(100)).await;
        let withdrawal = h.withdraw("u1", dec!(30)).await.unwrap();
        let deposit = h.deposit("u1", dec!(10)).await.transaction;

        let err = h
            .orchestrator
            .cancel_withdrawal_request("intruder", &withdrawal.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let err = h
            .orchestrator
            .cancel_withdrawal_request("u1", &deposit.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));

        let err = h
            .orchestrator
            .get_transaction_details("intruder", &withdrawal.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pagination_newest_first_without_overlap() {
        let h = Harness::new();
        for i in 0..15 {
            h.deposit("u1", dec!(10) + Decimal::from(i)).await;
        }
        h.deposit("someone-else", dec!(10)).await;

        let first = h
            .orchestrator
            .get_transaction_history(
                "u1",
                TransactionFilter {
                    limit: 10,
                    offset: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let second = h
            .orchestrator
            .get_transaction_history(
                "u1",
                TransactionFilter {
                    limit: 10,
                    offset: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(first.items.len(), 10);
        assert_eq!(second.items.len(), 5);
        assert_eq!(first.total, 15);
        assert_eq!(second.total, 15);

        let all: Vec<&Transaction> = first.items.iter().chain(second.items.iter()).collect();
        let ids: HashSet<&str> = all.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 15);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        // newest record was the 15th deposit
        assert_eq!(all[0].amount, dec!(24));
    }

    #[tokio::test]
    async fn test_history_filters_and_limits() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(100)).await;
        h.deposit("u1", dec!(10)).await;
        let withdrawal = h.withdraw("u1", dec!(5)).await.unwrap();

        let page = h
            .orchestrator
            .get_transaction_history(
                "u1",
                TransactionFilter {
                    kinds: HashSet::from([TransactionKind::Withdrawal]),
                    statuses: HashSet::from([TransactionStatus::Pending]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, withdrawal.id);

        for (limit, offset) in [(0, 0), (101, 0), (10, -1)] {
            let err = h
                .orchestrator
                .get_transaction_history(
                    "u1",
                    TransactionFilter {
                        limit,
                        offset,
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_marks_deposit_failed_and_releases_claim() {
        let h = Harness::new();
        h.ledger.fail_credits.store(true, Ordering::SeqCst);

        let err = h
            .orchestrator
            .process_deposit("u1", bank_deposit(dec!(50), true))
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        let CoreError::Upstream {
            transaction_id: Some(id),
            ..
        } = err
        else {
            panic!("expected upstream failure with transaction id");
        };

        let failed = h
            .orchestrator
            .get_transaction_details("u1", &id)
            .await
            .unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(
            failed.meta_str(meta::FAILURE_REASON),
            Some("ledger_unavailable")
        );
        assert!(
            !h.store
                .get_or_create_settings("u1")
                .await
                .unwrap()
                .has_initial_deposit
        );

        // a new attempt goes through once the ledger recovers
        h.ledger.fail_credits.store(false, Ordering::SeqCst);
        h.orchestrator
            .process_deposit("u1", bank_deposit(dec!(50), true))
            .await
            .unwrap();
        assert_eq!(h.balance("u1").await, dec!(50));
    }

    #[tokio::test]
    async fn test_failed_withdrawal_resolution_refunds() {
        let h = Harness::new();
        h.ledger.inner.set_balance("u1", dec!(100)).await;
        let withdrawal = h.withdraw("u1", dec!(60)).await.unwrap();

        let resolved = h
            .orchestrator
            .resolve_pending(&withdrawal.id, Resolution::Failed)
            .await
            .unwrap();
        assert_eq!(resolved.status, TransactionStatus::Failed);
        assert_eq!(h.balance("u1").await, dec!(100));

        let other = h.withdraw("u1", dec!(60)).await.unwrap();
        h.orchestrator
            .resolve_pending(&other.id, Resolution::Completed)
            .await
            .unwrap();
        assert_eq!(h.balance("u1").await, dec!(40));

        let err = h
            .orchestrator
            .cancel_withdrawal_request("u1", &other.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_expire_stale_crypto_deposits() {
        let h = Harness::new();
        let stale = h
            .orchestrator
            .process_deposit("u1", crypto_deposit(dec!(100), false))
            .await
            .unwrap()
            .transaction;
        let fresh = h
            .orchestrator
            .process_deposit("u1", crypto_deposit(dec!(100), false))
            .await
            .unwrap()
            .transaction;
        h.store
            .backdate(&stale.id, Utc::now() - chrono::Duration::hours(48))
            .await;

        let expired = h
            .orchestrator
            .expire_stale_crypto_deposits(Utc::now() - chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let stale = h
            .orchestrator
            .get_transaction_details("u1", &stale.id)
            .await
            .unwrap();
        assert_eq!(stale.status, TransactionStatus::Failed);
        assert_eq!(stale.meta_str(meta::FAILURE_REASON), Some("expired"));
        let fresh = h
            .orchestrator
            .get_transaction_details("u1", &fresh.id)
            .await
            .unwrap();
        assert_eq!(fresh.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_account_summary() {
        let h = Harness::new();
        h.orchestrator
            .process_deposit("u1", bank_deposit(dec!(200), true))
            .await
            .unwrap();
        h.withdraw("u1", dec!(50)).await.unwrap();

        let summary = h.orchestrator.account_summary("u1").await.unwrap();
        assert_eq!(summary.available_balance, dec!(150));
        assert_eq!(summary.total_deposits, dec!(200));
        assert_eq!(summary.total_withdrawals, Decimal::ZERO);
        assert_eq!(summary.pending_transactions, 1);
        assert!(summary.has_initial_deposit);
    }

    #[tokio::test]
    async fn test_change_events_reach_subscribers() {
        let h = Harness::new();
        let mut subscription = h.orchestrator.feed().subscribe("u1");

        let receipt = h.deposit("u1", dec!(25)).await;

        let event = subscription.recv().await.unwrap();
        assert_eq!(event.transaction_id, receipt.transaction.id);
        assert_eq!(event.status, TransactionStatus::Completed);
    }

    struct OfflineNotifier;

    #[async_trait::async_trait]
    impl NotificationEmitter for OfflineNotifier {
        async fn emit(&self, _notification: Notification) -> Result<(), UpstreamError> {
            Err(UpstreamError::new("emit_notification", "notification service offline"))
        }
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_operation() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(InMemoryLedger::new());
        let orchestrator = TransactionOrchestrator::new(
            store.clone(),
            ledger.clone(),
            Arc::new(OfflineNotifier),
            ChangeFeed::default(),
            DepositPolicy::default(),
        );

        let receipt = orchestrator
            .process_deposit("u1", bank_deposit(dec!(40), false))
            .await
            .unwrap();
        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        assert_eq!(ledger.get_balance("u1").await.unwrap(), dec!(40));

        let withdrawal = orchestrator
            .create_withdrawal_request(
                "u1",
                WithdrawalRequest {
                    amount: dec!(15),
                    wallet_address: "0xabc".to_string(),
                    network: "ethereum".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(withdrawal.status, TransactionStatus::Pending);
        assert_eq!(store.transaction_count().await, 2);
    }
}
