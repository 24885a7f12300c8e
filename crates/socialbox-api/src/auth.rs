//! Inbound request authentication.
//!
//! Every call must carry `Client-Name`, a `Client-Version` equal to the
//! supported protocol version, and a temporal signature over the SHA-512
//! hash of the raw request body. Who the signature is verified against
//! depends on the caller:
//!
//! - **Internal** callers present a `Session-UUID`; the signature verifies
//!   against the session's bound public key, or against one of the peer's
//!   registered signing keys once the session is authenticated.
//! - **External** servers present an `Identify-As` peer address instead of a
//!   session; the signature verifies against the *server* signing key
//!   published in the asserted domain's DNS discovery record.
//!
//! This is the single place that decides internal versus external; handlers
//! downstream only see the acting peer.

use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use socialbox_common::rpc::{headers, PROTOCOL_VERSION};
use socialbox_common::{PeerAddress, ProtocolError, ProtocolResult};
use socialbox_crypto::hash::sha512_hex;
use socialbox_crypto::temporal::verify_temporal;
use socialbox_protocol::{SessionRepository, SigningKeyRepository};
use uuid::Uuid;

use crate::AppState;

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Caller {
    pub peer: PeerAddress,
    /// Whether the request came from a federated server rather than a local
    /// client session.
    pub external: bool,
}

pub async fn authenticate(state: &AppState, headers: &HeaderMap, body: &[u8]) -> ProtocolResult<Caller> {
    require_json_content_type(headers)?;
    if header(headers, headers::CLIENT_NAME)?.is_empty() {
        return Err(ProtocolError::MissingParameter { name: headers::CLIENT_NAME.into() });
    }
    let version = header(headers, headers::CLIENT_VERSION)?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::Validation {
            message: format!("unsupported protocol version '{version}'"),
        });
    }
    let signature = header(headers, headers::SIGNATURE)?;
    let body_hash = sha512_hex(body);

    if let Some(identify_as) = optional_header(headers, headers::IDENTIFY_AS) {
        let peer: PeerAddress = identify_as.parse()?;
        if !peer.is_external(&state.local_domain) {
            // A local peer cannot be asserted through federation headers.
            return Err(ProtocolError::Unauthorized);
        }
        let server = state
            .resolver
            .resolve(peer.domain())
            .await
            .map_err(ProtocolError::from)?;
        let valid = verify_temporal(
            body_hash.as_bytes(),
            &signature,
            &server.public_signing_key,
            state.signature_window_count,
        )
        .map_err(ProtocolError::from)?;
        if !valid {
            return Err(ProtocolError::Unauthorized);
        }
        return Ok(Caller { peer, external: true });
    }

    let session_uuid: Uuid = header(headers, headers::SESSION_UUID)?
        .parse()
        .map_err(|_| ProtocolError::Validation { message: "invalid session uuid".into() })?;
    let session = state
        .sessions
        .get_session(session_uuid)
        .await?
        .ok_or(ProtocolError::Unauthorized)?;
    if !session.is_usable() {
        return Err(ProtocolError::Unauthorized);
    }

    let valid = verify_temporal(
        body_hash.as_bytes(),
        &signature,
        &session.bound_public_key,
        state.signature_window_count,
    )
    .map_err(ProtocolError::from)?;

    // Past the bound key, an authenticated peer may sign with any of its
    // registered keys still usable right now.
    if !valid {
        let peer = session.peer.as_ref().ok_or(ProtocolError::Unauthorized)?;
        let now = chrono::Utc::now();
        let mut matched = false;
        for key in state.signing_keys.list_keys(peer).await? {
            if key.is_usable(now)
                && verify_temporal(
                    body_hash.as_bytes(),
                    &signature,
                    &key.public_key,
                    state.signature_window_count,
                )
                .unwrap_or(false)
            {
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(ProtocolError::Unauthorized);
        }
    }

    let peer = session.peer.ok_or(ProtocolError::Unauthorized)?;
    Ok(Caller { peer, external: false })
}

/// Every request body is JSON; anything else is rejected before the
/// signature is even looked at. Parameters after the media type
/// (`; charset=utf-8`) are accepted.
fn require_json_content_type(headers: &HeaderMap) -> ProtocolResult<()> {
    let content_type = optional_header(headers, CONTENT_TYPE.as_str())
        .ok_or_else(|| ProtocolError::MissingParameter { name: "Content-Type".into() })?;
    if !content_type.trim().to_ascii_lowercase().starts_with("application/json") {
        return Err(ProtocolError::Validation {
            message: format!("unsupported content type '{content_type}'"),
        });
    }
    Ok(())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> ProtocolResult<&'a str> {
    optional_header(headers, name)
        .ok_or_else(|| ProtocolError::MissingParameter { name: name.to_string() })
}

fn optional_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
