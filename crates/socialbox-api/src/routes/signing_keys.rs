//! Registered signing key management.
//!
//! A peer may register additional signing keys up to the configured maximum.
//! Registered keys verify requests on authenticated sessions and the
//! `signature_uuid` references channels carry; keys are revocable and may
//! carry an expiry, after which they lapse to `EXPIRED` on read.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{body::Bytes, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socialbox_common::models::{SigningKeyRecord, SigningKeyState};
use socialbox_common::{ProtocolError, ProtocolResult};
use socialbox_crypto::keys::validate_public_signing_key;
use socialbox_protocol::SigningKeyRepository;
use uuid::Uuid;

use crate::auth::authenticate;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signing-keys", post(register_key))
        .route("/signing-keys", get(list_keys))
        .route("/signing-keys/{uuid}", delete(revoke_key))
}

#[derive(Deserialize)]
struct RegisterKeyBody {
    public_key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct RegisterKeyResponse {
    uuid: Uuid,
}

async fn register_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ProtocolResult<Json<RegisterKeyResponse>> {
    let caller = authenticate(&state, &headers, &body).await?;
    if caller.external {
        // Federated servers publish their key over DNS, not here.
        return Err(ProtocolError::Forbidden);
    }

    let parsed: RegisterKeyBody = serde_json::from_slice(&body)
        .map_err(|e| ProtocolError::Validation { message: format!("invalid body: {e}") })?;
    if !validate_public_signing_key(&parsed.public_key) {
        return Err(ProtocolError::Validation { message: "invalid public signing key".into() });
    }
    if let Some(expires_at) = parsed.expires_at {
        if expires_at <= Utc::now() {
            return Err(ProtocolError::Validation {
                message: "expiry must be in the future".into(),
            });
        }
    }

    let registered = state.signing_keys.count_keys(&caller.peer).await?;
    if registered >= u64::from(state.max_signing_keys) {
        return Err(ProtocolError::StateConflict {
            message: format!("signing key limit of {} reached", state.max_signing_keys),
        });
    }

    let record = SigningKeyRecord {
        uuid: Uuid::new_v4(),
        peer: caller.peer.clone(),
        public_key: parsed.public_key,
        name: parsed.name,
        state: SigningKeyState::Active,
        expires_at: parsed.expires_at,
        created_at: Utc::now(),
    };
    state.signing_keys.insert_key(&record).await?;
    tracing::info!(peer = %caller.peer, key = %record.uuid, "signing key registered");
    Ok(Json(RegisterKeyResponse { uuid: record.uuid }))
}

async fn list_keys(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ProtocolResult<Json<Vec<SigningKeyRecord>>> {
    let caller = authenticate(&state, &headers, &body).await?;
    if caller.external {
        return Err(ProtocolError::Forbidden);
    }

    // Lapse overdue keys before reporting state.
    state.signing_keys.expire_keys(Utc::now()).await?;
    let keys = state.signing_keys.list_keys(&caller.peer).await?;
    Ok(Json(keys))
}

async fn revoke_key(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> ProtocolResult<Json<serde_json::Value>> {
    let caller = authenticate(&state, &headers, &body).await?;
    if caller.external {
        return Err(ProtocolError::Forbidden);
    }

    if state.signing_keys.revoke_key(uuid, &caller.peer).await? {
        tracing::info!(peer = %caller.peer, key = %uuid, "signing key revoked");
        return Ok(Json(serde_json::json!({ "revoked": true })));
    }

    // Distinguish a repeat revocation from a key that was never theirs.
    match state.signing_keys.get_key(uuid).await? {
        Some(record) if record.peer == caller.peer => {
            Ok(Json(serde_json::json!({ "revoked": true })))
        }
        _ => Err(ProtocolError::NotFound { resource: format!("signing key {uuid}") }),
    }
}
