use std::fmt::Display;

use rust_decimal::Decimal;
use thiserror::Error;

/// Marker sent back to clients when the initial-deposit gate rejects a request.
pub const COMPLETE_INITIAL_DEPOSIT: &str = "complete_initial_deposit";

/// Failure of a collaborator the orchestrator does not own (store, ledger, notifier).
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {message}")]
pub struct UpstreamError {
    pub operation: String,
    pub message: String,
    pub retriable: bool,
}

impl UpstreamError {
    pub fn new(operation: impl Display, message: impl Display) -> Self {
        Self {
            operation: operation.to_string(),
            message: message.to_string(),
            retriable: true,
        }
    }

    pub fn permanent(operation: impl Display, message: impl Display) -> Self {
        Self {
            retriable: false,
            ..Self::new(operation, message)
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Initial deposit has already been processed")]
    DuplicateInitialDeposit,
    #[error("Insufficient balance")]
    InsufficientBalance,
}

impl PolicyViolation {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateInitialDeposit => "DUPLICATE_INITIAL_DEPOSIT",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Policy violation: {0}")]
    Policy(#[from] PolicyViolation),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Initial deposit required")]
    InitialDepositRequired { required_action: &'static str },
    #[error("Upstream failure: {source}")]
    Upstream {
        #[source]
        source: UpstreamError,
        transaction_id: Option<String>,
    },
}

impl CoreError {
    pub fn validation(message: impl Display) -> Self {
        Self::Validation(message.to_string())
    }

    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Upstream { source, .. } if source.retriable)
    }

    /// Attach the transaction whose record outlived the failure.
    pub fn for_transaction(self, id: &str) -> Self {
        match self {
            Self::Upstream { source, .. } => Self::Upstream {
                source,
                transaction_id: Some(id.to_string()),
            },
            other => other,
        }
    }
}

impl From<UpstreamError> for CoreError {
    fn from(source: UpstreamError) -> Self {
        Self::Upstream {
            source,
            transaction_id: None,
        }
    }
}

impl From<LedgerError> for CoreError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { .. } => {
                Self::Policy(PolicyViolation::InsufficientBalance)
            }
            LedgerError::Upstream(source) => source.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
