use std::sync::Arc;

use aurum_types::Role;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{COMPLETE_INITIAL_DEPOSIT, CoreError, CoreResult};
use crate::store::TransactionStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitialDepositStatus {
    pub has_initial_deposit: bool,
    pub minimum_amount: Decimal,
}

/// Guard placed in front of features that require a funded account.
#[derive(Clone)]
pub struct InitialDepositGate {
    store: Arc<dyn TransactionStore>,
    minimum_amount: Decimal,
}

impl InitialDepositGate {
    pub fn new(store: Arc<dyn TransactionStore>, minimum_amount: Decimal) -> Self {
        Self {
            store,
            minimum_amount,
        }
    }

    /// Passes admins through; everyone else needs a processed initial deposit.
    pub async fn require_initial_deposit(&self, user: &str, role: Role) -> CoreResult<()> {
        if role.is_admin() {
            return Ok(());
        }

        let settings = self.store.get_or_create_settings(user).await?;
        if settings.has_initial_deposit {
            Ok(())
        } else {
            tracing::debug!(user, "Initial deposit gate rejected request");
            Err(CoreError::InitialDepositRequired {
                required_action: COMPLETE_INITIAL_DEPOSIT,
            })
        }
    }

    pub async fn status(&self, user: &str) -> CoreResult<InitialDepositStatus> {
        let settings = self.store.get_or_create_settings(user).await?;
        Ok(InitialDepositStatus {
            has_initial_deposit: settings.has_initial_deposit,
            minimum_amount: self.minimum_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use rust_decimal::dec;

    fn gate() -> (InitialDepositGate, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (InitialDepositGate::new(store.clone(), dec!(50)), store)
    }

    #[tokio::test]
    async fn test_admin_passes_through() {
        let (gate, _) = gate();
        gate.require_initial_deposit("root", Role::Admin)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejects_until_initial_deposit() {
        let (gate, store) = gate();

        let err = gate
            .require_initial_deposit("u1", Role::User)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InitialDepositRequired {
                required_action: COMPLETE_INITIAL_DEPOSIT
            }
        ));
        // evaluating the guard again gives the same answer
        assert!(gate.require_initial_deposit("u1", Role::User).await.is_err());

        store.swap_initial_deposit("u1", false, true).await.unwrap();
        gate.require_initial_deposit("u1", Role::User)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_reports_minimum() {
        let (gate, _) = gate();
        let status = gate.status("u1").await.unwrap();
        assert!(!status.has_initial_deposit);
        assert_eq!(status.minimum_amount, dec!(50));
    }
}
