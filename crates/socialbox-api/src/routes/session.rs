//! Session bootstrap.
//!
//! A session starts unauthenticated, bound only to the public signing key
//! the client presents. Binding a peer identity requires a request signed
//! with that key; all subsequent RPC calls on the session verify against it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{body::Bytes, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use socialbox_common::models::{Session, SessionState};
use socialbox_common::rpc::headers;
use socialbox_common::{PeerAddress, ProtocolError, ProtocolResult};
use socialbox_crypto::hash::sha512_hex;
use socialbox_crypto::keys::validate_public_signing_key;
use socialbox_crypto::temporal::verify_temporal;
use socialbox_protocol::SessionRepository;
use uuid::Uuid;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/authenticate", post(authenticate_session))
}

#[derive(Deserialize)]
struct CreateSessionBody {
    public_key: String,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_uuid: Uuid,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionBody>,
) -> ProtocolResult<Json<CreateSessionResponse>> {
    if !validate_public_signing_key(&body.public_key) {
        return Err(ProtocolError::Validation {
            message: "invalid public signing key".into(),
        });
    }

    let session = Session {
        uuid: Uuid::new_v4(),
        bound_public_key: body.public_key,
        peer: None,
        authenticated: false,
        state: SessionState::Active,
        created_at: Utc::now(),
    };
    state.sessions.insert_session(&session).await?;
    tracing::debug!(session = %session.uuid, "session created");
    Ok(Json(CreateSessionResponse { session_uuid: session.uuid }))
}

#[derive(Deserialize)]
struct AuthenticateBody {
    peer: String,
}

async fn authenticate_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ProtocolResult<Json<serde_json::Value>> {
    let session_uuid: Uuid = headers
        .get(headers::SESSION_UUID)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ProtocolError::MissingParameter { name: headers::SESSION_UUID.into() })?
        .parse()
        .map_err(|_| ProtocolError::Validation { message: "invalid session uuid".into() })?;
    let signature = headers
        .get(headers::SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ProtocolError::MissingParameter { name: headers::SIGNATURE.into() })?;

    let session = state
        .sessions
        .get_session(session_uuid)
        .await?
        .ok_or(ProtocolError::Unauthorized)?;
    if !session.is_usable() {
        return Err(ProtocolError::Unauthorized);
    }

    let valid = verify_temporal(
        sha512_hex(&body).as_bytes(),
        signature,
        &session.bound_public_key,
        state.signature_window_count,
    )
    .map_err(ProtocolError::from)?;
    if !valid {
        return Err(ProtocolError::Unauthorized);
    }

    let parsed: AuthenticateBody = serde_json::from_slice(&body)
        .map_err(|e| ProtocolError::Validation { message: format!("invalid body: {e}") })?;
    let peer: PeerAddress = parsed.peer.parse()?;
    if peer.is_external(&state.local_domain) {
        // Sessions only ever belong to this server's own peers.
        return Err(ProtocolError::Forbidden);
    }

    state.sessions.authenticate_session(session_uuid, &peer).await?;
    tracing::info!(session = %session_uuid, %peer, "session authenticated");
    Ok(Json(serde_json::json!({ "authenticated": true })))
}
