pub mod currency;
pub mod role;
pub mod transaction;

pub use currency::Currency;
pub use role::Role;
pub use transaction::{PaymentMethod, TransactionKind, TransactionStatus};
