use std::collections::HashSet;
use std::hash::Hash;
use std::str::FromStr;

use aurum_core::model::{DEFAULT_PAGE_LIMIT, TransactionFilter};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::ApiError;

/// Query parameters of the transaction history endpoint
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionHistoryQuery {
    /// Comma separated transaction types, e.g. `deposit,withdrawal`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Comma separated statuses, e.g. `pending,completed`
    pub status: Option<String>,
    /// Page size, 1 to 100
    pub limit: Option<i64>,
    /// Number of records to skip
    pub offset: Option<i64>,
}

fn parse_set<T>(raw: Option<&str>, field: &str) -> Result<HashSet<T>, ApiError>
where
    T: FromStr + Eq + Hash,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            T::from_str(value)
                .map_err(|_| ApiError::BadRequest(format!("Invalid {field} filter '{value}'")))
        })
        .collect()
}

impl TryFrom<TransactionHistoryQuery> for TransactionFilter {
    type Error = ApiError;

    fn try_from(query: TransactionHistoryQuery) -> Result<Self, Self::Error> {
        Ok(Self {
            kinds: parse_set(query.kind.as_deref(), "type")?,
            statuses: parse_set(query.status.as_deref(), "status")?,
            limit: query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            offset: query.offset.unwrap_or(0),
        })
    }
}
