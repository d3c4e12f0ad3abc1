use pragma_common::services::{Service, ServiceRunner};

use crate::config::SweeperConfig;
use crate::orchestrator::TransactionOrchestrator;
use crate::sweeper::DepositSweeper;

pub struct SweeperTask {
    orchestrator: TransactionOrchestrator,
    config: SweeperConfig,
}

impl SweeperTask {
    pub const fn new(orchestrator: TransactionOrchestrator, config: SweeperConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }
}

#[async_trait::async_trait]
impl Service for SweeperTask {
    async fn start<'a>(&mut self, mut runner: ServiceRunner<'a>) -> anyhow::Result<()> {
        let orchestrator = self.orchestrator.clone();
        let config = self.config.clone();

        runner.spawn_loop(move |ctx| async move {
            let sweeper = DepositSweeper::new(orchestrator, config);

            if let Some(result) = ctx.run_until_cancelled(sweeper.run_forever()).await {
                result?;
            }

            anyhow::Ok(())
        });

        Ok(())
    }
}
