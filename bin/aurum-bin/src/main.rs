mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use pragma_common::{services::ServiceGroup, telemetry::init_telemetry};

use aurum_api::auth::HttpIdentityVerifier;
use aurum_api::{ApiService, AppState};
use aurum_core::memory::{InMemoryLedger, InMemoryStore};
use aurum_core::{
    ChangeFeed, InitialDepositGate, LedgerGateway, NotificationEmitter, SweeperTask,
    TracingNotifier, TransactionOrchestrator, TransactionStore,
};
use aurum_db::{
    PgLedgerGateway, PgNotificationEmitter, PgTransactionStore, init_pool, run_migrations,
};
use aurum_metrics::MetricsRegistry;

use crate::cli::{AurumCli, StorageBackend};

type Backends = (
    Arc<dyn TransactionStore>,
    Arc<dyn LedgerGateway>,
    Arc<dyn NotificationEmitter>,
);

async fn init_backends(app_name: &str, cli: &AurumCli) -> Result<Backends> {
    match cli.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, all data is lost on restart");
            let store: Arc<dyn TransactionStore> = Arc::new(InMemoryStore::new());
            let ledger: Arc<dyn LedgerGateway> = Arc::new(InMemoryLedger::new());
            let notifier: Arc<dyn NotificationEmitter> = Arc::new(TracingNotifier);
            Ok((store, ledger, notifier))
        }
        StorageBackend::Postgres => {
            let database_url = cli
                .database_url
                .as_deref()
                .context("DATABASE_URL is required with the postgres backend")?;
            let pool = init_pool(app_name, database_url)?;
            run_migrations(&pool).await?;

            let store: Arc<dyn TransactionStore> =
                Arc::new(PgTransactionStore::new(pool.clone()));
            let ledger: Arc<dyn LedgerGateway> = Arc::new(PgLedgerGateway::new(pool.clone()));
            let notifier: Arc<dyn NotificationEmitter> =
                Arc::new(PgNotificationEmitter::new(pool));
            Ok((store, ledger, notifier))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cli = AurumCli::parse();

    let app_name = "aurum_api";
    if let Err(e) = init_telemetry(app_name, cli.otel_collector_endpoint.clone()) {
        panic!("Could not init telemetry: {e}");
    }

    let (store, ledger, notifier) = init_backends(app_name, &cli).await?;
    let policy = cli.deposit_policy();

    let gate = InitialDepositGate::new(store.clone(), policy.initial_minimum);
    let orchestrator =
        TransactionOrchestrator::new(store, ledger, notifier, ChangeFeed::default(), policy);

    let verifier =
        HttpIdentityVerifier::new(&cli.auth_provider_url, cli.auth_provider_api_key.clone())?;

    let app_state = AppState {
        orchestrator: orchestrator.clone(),
        gate,
        verifier: Arc::new(verifier),
        metrics: MetricsRegistry::new(),
    };

    let api_service = ApiService::new(app_state, "0.0.0.0", cli.api_port);
    let sweeper_service = SweeperTask::new(orchestrator, cli.sweeper_config());

    ServiceGroup::default()
        .with(api_service)
        .with(sweeper_service)
        .start_and_drive_to_end()
        .await?;

    Ok(())
}
