use chrono::Utc;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel::{select, result::Error as DieselError};
use rust_decimal::Decimal;

use crate::schema::{ledger_balances, ledger_entries};

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ledger_entries)]
pub struct NewLedgerEntry<'a> {
    pub txn_ref: &'a str,
    pub owner: &'a str,
    pub delta: Decimal,
}

/// Result of a conditional debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Debit applied (now or by an earlier call with the same reference).
    Applied(Decimal),
    /// Balance did not cover the amount, nothing was written.
    Insufficient(Decimal),
}

pub struct LedgerBalance;

impl LedgerBalance {
    pub fn available(owner: &str, conn: &mut PgConnection) -> QueryResult<Decimal> {
        ledger_balances::table
            .find(owner)
            .select(ledger_balances::available)
            .first::<Decimal>(conn)
            .optional()
            .map(Option::unwrap_or_default)
    }

    fn is_applied(txn_ref: &str, conn: &mut PgConnection) -> QueryResult<bool> {
        select(exists(ledger_entries::table.find(txn_ref))).get_result(conn)
    }

    /// Adds `amount` once per `txn_ref`.
    pub fn credit(
        owner: &str,
        amount: Decimal,
        txn_ref: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<Decimal> {
        conn.transaction::<_, DieselError, _>(|conn| {
            let recorded = diesel::insert_into(ledger_entries::table)
                .values(&NewLedgerEntry {
                    txn_ref,
                    owner,
                    delta: amount,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;

            if recorded == 0 {
                return Self::available(owner, conn);
            }

            diesel::insert_into(ledger_balances::table)
                .values((
                    ledger_balances::owner.eq(owner),
                    ledger_balances::available.eq(amount),
                ))
                .on_conflict(ledger_balances::owner)
                .do_update()
                .set((
                    ledger_balances::available
                        .eq(ledger_balances::available + excluded(ledger_balances::available)),
                    ledger_balances::updated_at.eq(Utc::now()),
                ))
                .returning(ledger_balances::available)
                .get_result(conn)
        })
    }

    /// Subtracts `amount` in one conditional statement. The row lock taken by
    /// the update serializes concurrent debits of the same owner.
    pub fn debit(
        owner: &str,
        amount: Decimal,
        txn_ref: &str,
        conn: &mut PgConnection,
    ) -> QueryResult<DebitOutcome> {
        conn.transaction::<_, DieselError, _>(|conn| {
            if Self::is_applied(txn_ref, conn)? {
                return Self::available(owner, conn).map(DebitOutcome::Applied);
            }

            let debited = diesel::update(
                ledger_balances::table
                    .find(owner)
                    .filter(ledger_balances::available.ge(amount)),
            )
            .set((
                ledger_balances::available.eq(ledger_balances::available - amount),
                ledger_balances::updated_at.eq(Utc::now()),
            ))
            .returning(ledger_balances::available)
            .get_result::<Decimal>(conn)
            .optional()?;

            let Some(balance) = debited else {
                return Self::available(owner, conn).map(DebitOutcome::Insufficient);
            };

            diesel::insert_into(ledger_entries::table)
                .values(&NewLedgerEntry {
                    txn_ref,
                    owner,
                    delta: -amount,
                })
                .execute(conn)?;

            Ok(DebitOutcome::Applied(balance))
        })
    }
}
