use std::time::{Duration, Instant};

use deadpool_diesel::postgres::Pool;
use diesel::PgConnection;

use crate::errors::DatabaseError;

/// Queries slower than this are logged at `warn`.
const SLOW_QUERY: Duration = Duration::from_millis(500);

/// Connection pool handle shared by the store, the ledger and the notifier.
///
/// Every call names its operation; the name ends up in the returned
/// [`DatabaseError`] and in the logs, so an upstream failure reported by the
/// orchestrator can be traced back to the query that caused it.
#[derive(Clone)]
pub struct Db {
    pool: Pool,
}

impl Db {
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Runs `query` on a pooled connection.
    pub async fn run<F, T, E>(
        &self,
        operation: impl Into<String>,
        query: F,
    ) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<DatabaseError> + Send + 'static,
    {
        let operation = operation.into();
        let started = Instant::now();

        let conn = self.pool.get().await.map_err(|e| {
            tracing::error!(%operation, error = %e, "No database connection available");
            DatabaseError::PoolError {
                operation: operation.clone(),
                message: e.to_string(),
            }
        })?;

        let outcome = match conn.interact(query).await {
            Ok(result) => result.map_err(|e| {
                let err: DatabaseError = e.into();
                err.with_operation(&operation)
            }),
            Err(e) => Err(DatabaseError::InteractionError {
                operation: operation.clone(),
                message: e.to_string(),
            }),
        };

        let elapsed = started.elapsed();
        match &outcome {
            Err(err) if err.is_not_found() => {
                tracing::debug!(%operation, ?elapsed, "No matching row");
            }
            Err(err) => tracing::error!(%operation, ?elapsed, error = %err, "Query failed"),
            Ok(_) if elapsed >= SLOW_QUERY => {
                tracing::warn!(%operation, ?elapsed, "Slow query");
            }
            Ok(_) => tracing::trace!(%operation, ?elapsed, "Query done"),
        }

        outcome
    }
}
