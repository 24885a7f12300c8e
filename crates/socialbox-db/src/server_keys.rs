//! The server's own federation signing key.
//!
//! Generated once on first startup and persisted; the public half is what
//! the operator publishes in the DNS discovery record.

use socialbox_common::{ProtocolError, ProtocolResult};
use socialbox_crypto::SigningKeyPair;
use sqlx::{PgPool, Row};

use crate::storage_error;

/// Row name of the federation signing key.
pub const FEDERATION_KEY: &str = "federation";

/// Load the named server key, generating and persisting it if absent.
pub async fn load_or_generate(pool: &PgPool, name: &str) -> ProtocolResult<SigningKeyPair> {
    if let Some(kp) = load(pool, name).await? {
        return Ok(kp);
    }

    let kp = SigningKeyPair::generate();
    sqlx::query(
        r#"
        INSERT INTO server_keys (name, seed, public_key)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(name)
    .bind(kp.seed_bytes().to_vec())
    .bind(kp.public_key())
    .execute(pool)
    .await
    .map_err(storage_error)?;
    tracing::info!(name, public_key = %kp.public_key(), "generated new server signing key");

    // Another instance may have won the insert race; the persisted row is
    // authoritative either way.
    load(pool, name)
        .await?
        .ok_or_else(|| ProtocolError::Internal(anyhow::anyhow!("server key vanished after insert")))
}

async fn load(pool: &PgPool, name: &str) -> ProtocolResult<Option<SigningKeyPair>> {
    let row = sqlx::query("SELECT seed FROM server_keys WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(storage_error)?;
    let Some(row) = row else { return Ok(None) };
    let seed: Vec<u8> = row.try_get("seed").map_err(storage_error)?;
    SigningKeyPair::from_seed(&seed).map(Some).map_err(ProtocolError::from)
}
