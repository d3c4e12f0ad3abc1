use aurum_core::model::{AccountSummary, DepositReceipt, Resolution, Transaction};
use aurum_core::{ChangeEvent, InitialDepositStatus};
use aurum_types::{Currency, PaymentMethod, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;


#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: String,
    pub currency: Currency,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[schema(value_type = Object)]
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionDto {
    fn from(txn: Transaction) -> Self {
        Self {
            id: txn.id,
            kind: txn.kind,
            amount: txn.amount.to_string(),
            currency: txn.currency,
            status: txn.status,
            payment_method: txn.payment_method,
            metadata: txn.metadata,
            created_at: txn.created_at,
            updated_at: txn.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDepositRequest {
    /// Accepted as a JSON number or a decimal string.
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub is_initial_deposit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitialDepositRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Currency,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub transaction: TransactionDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub requires_confirmation: bool,
}

impl From<DepositReceipt> for DepositResponse {
    fn from(receipt: DepositReceipt) -> Self {
        Self {
            transaction: receipt.transaction.into(),
            deposit_address: receipt.deposit_address,
            network: receipt.network,
            requires_confirmation: receipt.requires_confirmation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalRequest {
    pub amount: Decimal,
    pub wallet_address: String,
    pub network: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionOutcome {
    Completed,
    Failed,
}

impl From<ResolutionOutcome> for Resolution {
    fn from(outcome: ResolutionOutcome) -> Self {
        match outcome {
            ResolutionOutcome::Completed => Self::Completed,
            ResolutionOutcome::Failed => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResolveTransactionRequest {
    pub outcome: ResolutionOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummaryDto {
    pub available_balance: String,
    pub total_deposits: String,
    pub total_withdrawals: String,
    pub pending_transactions: i64,
    pub has_initial_deposit: bool,
}

impl From<AccountSummary> for AccountSummaryDto {
    fn from(summary: AccountSummary) -> Self {
        Self {
            available_balance: summary.available_balance.to_string(),
            total_deposits: summary.total_deposits.to_string(),
            total_withdrawals: summary.total_withdrawals.to_string(),
            pending_transactions: summary.pending_transactions,
            has_initial_deposit: summary.has_initial_deposit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitialDepositStatusDto {
    pub has_initial_deposit: bool,
    pub minimum_amount: String,
}

impl From<InitialDepositStatus> for InitialDepositStatusDto {
    fn from(status: InitialDepositStatus) -> Self {
        Self {
            has_initial_deposit: status.has_initial_deposit,
            minimum_amount: status.minimum_amount.to_string(),
        }
    }
}

/// Message pushed on the transaction stream.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEventDto {
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: String,
    pub at: DateTime<Utc>,
}

impl From<ChangeEvent> for ChangeEventDto {
    fn from(event: ChangeEvent) -> Self {
        Self {
            transaction_id: event.transaction_id,
            kind: event.kind,
            status: event.status,
            amount: event.amount.to_string(),
            at: event.at,
        }
    }
}
