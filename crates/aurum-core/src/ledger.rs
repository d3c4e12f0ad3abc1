use aurum_types::PaymentMethod;
use rust_decimal::Decimal;

use crate::error::LedgerError;

/// System of record for per-user available balance.
///
/// Every mutating call is atomic and idempotent with respect to `txn_ref`:
/// replaying a reference that was already applied returns the current balance
/// without moving funds again.
#[async_trait::async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn get_balance(&self, user: &str) -> Result<Decimal, LedgerError>;

    async fn credit(&self, user: &str, amount: Decimal, txn_ref: &str)
    -> Result<Decimal, LedgerError>;

    /// Debits `amount` only if the available balance covers it, in a single
    /// step. Fails with `LedgerError::InsufficientFunds` otherwise.
    async fn reserve_and_debit(
        &self,
        user: &str,
        amount: Decimal,
        txn_ref: &str,
    ) -> Result<Decimal, LedgerError>;

    async fn commit_deposit(
        &self,
        user: &str,
        amount: Decimal,
        method: PaymentMethod,
        txn_ref: &str,
    ) -> Result<Decimal, LedgerError> {
        tracing::debug!(user, %amount, method = method.as_str(), txn_ref, "Committing deposit");
        self.credit(user, amount, txn_ref).await
    }
}
