//! SeaORM connection pool management.

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::AppConfig;

const CONNECT_ATTEMPTS: u32 = 5;

/// Errors raised while establishing the pool.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Open the connection pool, retrying transient connect failures with
/// exponential backoff. A pool that cannot be established within the
/// retry budget is a fatal dependency-init failure for the caller.
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "database URL cannot be empty".to_string(),
        }
        .into());
    }

    let mut options = ConnectOptions::new(&cfg.database_url);
    options
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut delay = Duration::from_millis(100);
    let mut last_error = None;

    for attempt in 1..=CONNECT_ATTEMPTS {
        match Database::connect(options.clone()).await {
            Ok(pool) => {
                info!(attempt, "Database pool established");
                return Ok(pool);
            }
            Err(e) => {
                warn!(attempt, error = %e, retry_in_ms = delay.as_millis() as u64, "Database connect failed");
                last_error = Some(e);
                if attempt < CONNECT_ATTEMPTS {
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(DatabaseError::ConnectionFailed {
        source: last_error.expect("at least one connect attempt"),
    }
    .into())
}

/// Verify the pool is usable with a trivial query.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .context("database health check failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_database_url_is_rejected() {
        let mut config = AppConfig::default();
        config.database_url = "".to_string();

        let result = init_pool(&config).await;

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }
}
