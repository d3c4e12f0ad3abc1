use aurum_core::{LedgerError, LedgerGateway};
use deadpool_diesel::postgres::Pool;
use rust_decimal::Decimal;

use crate::models::{DebitOutcome, LedgerBalance};
use crate::pool::Db;

/// Balance ledger kept in the same Postgres database, in the
/// `ledger_balances` and `ledger_entries` tables.
#[derive(Clone)]
pub struct PgLedgerGateway {
    db: Db,
}

impl PgLedgerGateway {
    pub const fn new(pool: Pool) -> Self {
        Self { db: Db::new(pool) }
    }
}

#[async_trait::async_trait]
impl LedgerGateway for PgLedgerGateway {
    async fn get_balance(&self, user: &str) -> Result<Decimal, LedgerError> {
        let owner = user.to_string();
        Ok(self
            .db
            .run(format!("read balance of {owner}"), move |conn| {
                LedgerBalance::available(&owner, conn)
            })
            .await?)
    }

    async fn credit(
        &self,
        user: &str,
        amount: Decimal,
        txn_ref: &str,
    ) -> Result<Decimal, LedgerError> {
        let (owner, txn_ref) = (user.to_string(), txn_ref.to_string());
        Ok(self
            .db
            .run(format!("credit {txn_ref}"), move |conn| {
                LedgerBalance::credit(&owner, amount, &txn_ref, conn)
            })
            .await?)
    }

    async fn reserve_and_debit(
        &self,
        user: &str,
        amount: Decimal,
        txn_ref: &str,
    ) -> Result<Decimal, LedgerError> {
        let (owner, reference) = (user.to_string(), txn_ref.to_string());
        let outcome = self
            .db
            .run(format!("debit {txn_ref}"), move |conn| {
                LedgerBalance::debit(&owner, amount, &reference, conn)
            })
            .await?;

        match outcome {
            DebitOutcome::Applied(balance) => Ok(balance),
            DebitOutcome::Insufficient(available) => {
                tracing::info!(user, %amount, %available, txn_ref, "Debit refused");
                Err(LedgerError::InsufficientFunds {
                    requested: amount,
                    available,
                })
            }
        }
    }
}
