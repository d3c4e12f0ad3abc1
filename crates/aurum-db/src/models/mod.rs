pub mod ledger;
pub mod notification;
pub mod transaction;
pub mod user_settings;
pub mod wallet;

pub use ledger::{DebitOutcome, LedgerBalance, NewLedgerEntry};
pub use notification::NewNotificationRow;
pub use transaction::{NewTransactionRow, RowFilter, RowTotals, TransactionRow};
pub use user_settings::UserSettingsRow;
pub use wallet::{NewWalletRow, WalletRow};
