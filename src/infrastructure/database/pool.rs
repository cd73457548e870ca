use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Open the connection pool, retrying while the database comes up.
///
/// Makes at most `retry_count` attempts (always at least one) with a one
/// second pause between them, then gives up with the last error.
pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<PgPool> {
    // ---
    let options = config.connection.connect_options()?;
    let attempts = config.retry_count.max(1);

    let mut attempt = 1;
    loop {
        let result = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options.clone())
            .await;

        match result {
            Ok(pool) => {
                tracing::info!(attempt, "database pool ready");
                return Ok(pool);
            }
            Err(err) if attempt < attempts => {
                tracing::warn!(attempt, attempts, error = %err, "database not reachable, retrying");
                tokio::time::sleep(RETRY_PAUSE).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("database unreachable after {attempts} attempts"));
            }
        }
    }
}
