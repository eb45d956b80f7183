//! SeaORM pool construction and liveness checks.

use anyhow::{Context, Result};
use rand::Rng;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database URL is not configured")]
    MissingUrl,
    #[error("could not connect after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        source: sea_orm::DbErr,
    },
}

/// Build the shared connection pool, retrying transient connect failures.
///
/// Backoff is exponential with jitter so a fleet of restarting instances
/// does not reconnect in lockstep.
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DbError::MissingUrl.into());
    }

    let mut options = ConnectOptions::new(&cfg.database_url);
    options
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match Database::connect(options.clone()).await {
            Ok(pool) => {
                info!(attempt, "Database pool ready");
                return Ok(pool);
            }
            Err(source) if attempt < CONNECT_ATTEMPTS => {
                let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4);
                let delay = backoff + Duration::from_millis(jitter_ms);
                warn!(attempt, error = %source, ?delay, "Database connect failed; retrying");
                sleep(delay).await;
                backoff *= 2;
            }
            Err(source) => {
                return Err(DbError::Exhausted {
                    attempts: attempt,
                    source,
                }
                .into());
            }
        }
    }
}

/// Round-trip ping used by the health endpoint
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    db.ping().await.context("database ping failed")
}
