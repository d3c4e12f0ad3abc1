pub mod errors;
pub mod ledger;
pub mod models;
pub mod notifier;
pub mod pool;
pub mod schema;
pub mod store;

use deadpool_diesel::postgres::{Manager, Pool};
use deadpool_diesel::Runtime;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

pub use errors::{DatabaseError, ErrorKind};
pub use ledger::PgLedgerGateway;
pub use notifier::PgNotificationEmitter;
pub use pool::Db;
pub use store::PgTransactionStore;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const MAX_POOL_SIZE: usize = 16;

/// Tags the connection with `application_name` so sessions are identifiable
/// in `pg_stat_activity`.
fn with_application_name(database_url: &str, app_name: &str) -> String {
    if database_url.contains("application_name=") {
        return database_url.to_string();
    }
    let separator = if database_url.contains('?') { '&' } else { '?' };
    format!("{database_url}{separator}application_name={app_name}")
}

pub fn init_pool(app_name: &str, database_url: &str) -> Result<Pool, ErrorKind> {
    let manager = Manager::new(
        with_application_name(database_url, app_name),
        Runtime::Tokio1,
    );

    Pool::builder(manager)
        .max_size(MAX_POOL_SIZE)
        .build()
        .map_err(|e| ErrorKind::Pool(e.to_string()))
}

pub async fn run_migrations(pool: &Pool) -> Result<(), ErrorKind> {
    let applied = Db::new(pool.clone())
        .run("run migrations", |conn| {
            conn.run_pending_migrations(MIGRATIONS)
                .map(|versions| versions.len())
                .map_err(|e| DatabaseError::QueryError {
                    operation: "run migrations".to_string(),
                    message: e.to_string(),
                })
        })
        .await
        .map_err(|e| ErrorKind::Migration(e.to_string()))?;

    tracing::info!(applied, "Database migrations up to date");
    Ok(())
}
