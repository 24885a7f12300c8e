//! # socialbox-db
//!
//! PostgreSQL persistence for Socialbox: encryption channels and their
//! message queues, the DNS resolution cache, client sessions, registered
//! peer signing keys, and the server's own federation key.
//!
//! Every store wraps driver errors into `ProtocolError::Internal` before
//! returning; raw `sqlx` errors never cross this boundary.

pub mod repository;
pub mod server_keys;

use anyhow::Result;
use socialbox_common::config::AppConfig;
use socialbox_common::{ProtocolError, ProtocolResult};
use sqlx::PgPool;

/// Shared database handle passed to each store.
#[derive(Clone)]
pub struct Database {
    pub pg: PgPool,
}

impl Database {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        tracing::info!("Connecting to PostgreSQL...");
        let pg = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await?;
        tracing::info!("Connected to PostgreSQL");
        Ok(Self { pg })
    }

    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pg).await?;
        tracing::info!("Migrations complete");
        Ok(())
    }
}

/// Health check — verify the database is reachable.
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

pub(crate) fn storage_error(e: sqlx::Error) -> ProtocolError {
    ProtocolError::Internal(anyhow::anyhow!("database operation failed: {e}"))
}

pub(crate) type DbResult<T> = ProtocolResult<T>;
