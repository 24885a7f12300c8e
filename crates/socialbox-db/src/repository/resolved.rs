//! Persisted DNS resolution cache.

use socialbox_common::models::ResolvedServer;
use socialbox_resolver::RecordCache;
use sqlx::{PgPool, Row};
use url::Url;

use crate::{storage_error, DbResult};
use socialbox_common::ProtocolError;

#[derive(Clone)]
pub struct ResolvedServerStore {
    pool: PgPool,
}

impl ResolvedServerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RecordCache for ResolvedServerStore {
    async fn get(&self, domain: &str) -> DbResult<Option<ResolvedServer>> {
        let row = sqlx::query(
            "SELECT rpc_endpoint, public_signing_key, expires_at
             FROM resolved_servers WHERE domain = $1",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else { return Ok(None) };
        let endpoint: String = row.try_get("rpc_endpoint").map_err(storage_error)?;
        Ok(Some(ResolvedServer {
            rpc_endpoint: Url::parse(&endpoint).map_err(|e| {
                ProtocolError::Internal(anyhow::anyhow!("corrupt cached rpc endpoint: {e}"))
            })?,
            public_signing_key: row.try_get("public_signing_key").map_err(storage_error)?,
            expires_at: row.try_get("expires_at").map_err(storage_error)?,
        }))
    }

    // Atomic insert-or-update keyed by domain; concurrent resolutions of the
    // same domain cannot lose updates.
    async fn upsert(&self, domain: &str, record: &ResolvedServer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO resolved_servers (domain, rpc_endpoint, public_signing_key, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (domain) DO UPDATE SET
                rpc_endpoint = EXCLUDED.rpc_endpoint,
                public_signing_key = EXCLUDED.public_signing_key,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(domain)
        .bind(record.rpc_endpoint.to_string())
        .bind(&record.public_signing_key)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}
