use anyhow::Result;
use chrono::Utc;

use crate::config::SweeperConfig;
use crate::orchestrator::TransactionOrchestrator;

/// Periodically fails crypto deposits whose funds never arrived.
pub struct DepositSweeper {
    orchestrator: TransactionOrchestrator,
    config: SweeperConfig,
}

impl DepositSweeper {
    pub const fn new(orchestrator: TransactionOrchestrator, config: SweeperConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub async fn run_forever(&self) -> Result<()> {
        loop {
            let pause = match self.sweep_once().await {
                Ok(_) => self.config.interval,
                Err(e) => {
                    tracing::error!("[DepositSweeper] 🔴 Sweep failed: {e}");
                    self.config.error_backoff
                }
            };

            tokio::time::sleep(pause).await;
        }
    }

    /// Runs a single pass and returns how many deposits were expired.
    pub async fn sweep_once(&self) -> Result<usize> {
        let ttl = chrono::Duration::from_std(self.config.crypto_deposit_ttl)?;
        let cutoff = Utc::now() - ttl;

        let expired = self
            .orchestrator
            .expire_stale_crypto_deposits(cutoff)
            .await?;

        if expired > 0 {
            tracing::info!("[DepositSweeper] ⌛ Expired {expired} stale crypto deposits");
        } else {
            tracing::debug!("[DepositSweeper] No stale crypto deposits");
        }

        Ok(expired)
    }
}
