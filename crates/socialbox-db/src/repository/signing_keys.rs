//! Registered peer signing key storage.

use chrono::{DateTime, Utc};
use socialbox_common::models::SigningKeyRecord;
use socialbox_common::PeerAddress;
use socialbox_protocol::SigningKeyRepository;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{storage_error, DbResult};

#[derive(Clone)]
pub struct SigningKeyStore {
    pool: PgPool,
}

impl SigningKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_key(row: &PgRow) -> DbResult<SigningKeyRecord> {
    let state: String = row.try_get("state").map_err(storage_error)?;
    let peer: String = row.try_get("peer").map_err(storage_error)?;
    Ok(SigningKeyRecord {
        uuid: row.try_get("uuid").map_err(storage_error)?,
        peer: peer.parse()?,
        public_key: row.try_get("public_key").map_err(storage_error)?,
        name: row.try_get("name").map_err(storage_error)?,
        state: state.parse()?,
        expires_at: row.try_get("expires_at").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
    })
}

impl SigningKeyRepository for SigningKeyStore {
    async fn insert_key(&self, record: &SigningKeyRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO signing_keys (uuid, peer, public_key, name, state, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.uuid)
        .bind(record.peer.to_string())
        .bind(&record.public_key)
        .bind(&record.name)
        .bind(record.state.as_str())
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_key(&self, uuid: Uuid) -> DbResult<Option<SigningKeyRecord>> {
        let row = sqlx::query("SELECT * FROM signing_keys WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(map_key).transpose()
    }

    async fn list_keys(&self, peer: &PeerAddress) -> DbResult<Vec<SigningKeyRecord>> {
        let rows =
            sqlx::query("SELECT * FROM signing_keys WHERE peer = $1 ORDER BY created_at ASC")
                .bind(peer.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;
        rows.iter().map(map_key).collect()
    }

    async fn count_keys(&self, peer: &PeerAddress) -> DbResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) FROM signing_keys WHERE peer = $1")
            .bind(peer.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        let count: i64 = row.try_get(0).map_err(storage_error)?;
        Ok(count as u64)
    }

    async fn revoke_key(&self, uuid: Uuid, peer: &PeerAddress) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE signing_keys SET state = 'REVOKED'
             WHERE uuid = $1 AND peer = $2 AND state = 'ACTIVE'",
        )
        .bind(uuid)
        .bind(peer.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_keys(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE signing_keys SET state = 'EXPIRED'
             WHERE state = 'ACTIVE' AND expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}
