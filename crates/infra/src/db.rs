//! Postgres connection pool.

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, instrument, warn};

use crate::config::DatabaseConfig;

const CONNECT_RETRIES: u32 = 5;

#[derive(Debug, thiserror::Error)]
#[error("could not connect to postgres after {attempts} attempts: {source}")]
pub struct ConnectError {
    pub attempts: u32,
    #[source]
    pub source: sqlx::Error,
}

/// Open the shared pool, retrying with doubling backoff while the database
/// comes up.
///
/// The same pool serves request handlers and report execution.
#[instrument(skip(config), fields(max_connections = config.max_connections))]
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, ConnectError> {
    let mut attempt = 0;
    let mut delay = Duration::from_millis(500);

    loop {
        attempt += 1;
        match PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
        {
            Ok(pool) => {
                info!("postgres connection pool established");
                return Ok(pool);
            }
            Err(e) if attempt <= CONNECT_RETRIES => {
                warn!(
                    error = %e,
                    retries_left = CONNECT_RETRIES + 1 - attempt,
                    delay_ms = delay.as_millis() as u64,
                    "postgres connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(source) => {
                return Err(ConnectError {
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}
