pub mod config;
pub mod error;
pub mod feed;
pub mod gate;
pub mod ledger;
pub mod memory;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod sweeper;
pub mod task;

pub use config::{CryptoDepositAddress, DepositPolicy, SweeperConfig};
pub use error::{
    COMPLETE_INITIAL_DEPOSIT, CoreError, CoreResult, LedgerError, PolicyViolation, UpstreamError,
};
pub use feed::{ChangeEvent, ChangeFeed, Subscription};
pub use gate::{InitialDepositGate, InitialDepositStatus};
pub use ledger::LedgerGateway;
pub use notify::{Notification, NotificationEmitter, NotificationKind, TracingNotifier};
pub use orchestrator::TransactionOrchestrator;
pub use store::{StoreResult, TransactionStore};
pub use sweeper::DepositSweeper;
pub use task::SweeperTask;
