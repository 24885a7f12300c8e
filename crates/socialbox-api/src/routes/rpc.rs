//! The RPC endpoint.
//!
//! All eleven `Encryption*` methods arrive here as JSON envelopes, singly or
//! as a batch array. The caller is authenticated once at entry — internal
//! session or external federated server — and every method then operates on
//! the acting peer; no handler re-derives the caller.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{body::Bytes, Json, Router};
use serde_json::{json, Value};
use socialbox_common::models::ReceiverKeys;
use socialbox_common::rpc::{methods, params, RpcCall, RpcResponse};
use socialbox_common::{ProtocolError, ProtocolResult};
use socialbox_protocol::CreateChannelRequest;
use tracing::debug;

use crate::auth::{authenticate, Caller};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/rpc", post(handle_rpc))
}

async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ProtocolResult<Json<Value>> {
    let caller = authenticate(&state, &headers, &body).await?;

    let parsed: Value = serde_json::from_slice(&body)
        .map_err(|e| ProtocolError::Validation { message: format!("invalid request body: {e}") })?;

    // A batch is a JSON array of calls; responses come back in order.
    if let Value::Array(entries) = parsed {
        let mut responses = Vec::with_capacity(entries.len());
        for entry in entries {
            responses.push(dispatch_value(&state, &caller, entry).await);
        }
        return Ok(Json(json!(responses)));
    }

    let response = dispatch_value(&state, &caller, parsed).await;
    Ok(Json(json!(response)))
}

async fn dispatch_value(state: &AppState, caller: &Caller, entry: Value) -> RpcResponse {
    let call: RpcCall = match serde_json::from_value(entry) {
        Ok(call) => call,
        Err(e) => {
            return RpcResponse::failure("", "VALIDATION_ERROR", &format!("malformed call: {e}"));
        }
    };
    let id = call.id.clone();
    match dispatch(state, caller, call).await {
        Ok(result) => RpcResponse::success(&id, result),
        Err(e) => failure(&id, &e),
    }
}

/// Map a typed error to the RPC envelope, suppressing internal detail.
fn failure(id: &str, error: &ProtocolError) -> RpcResponse {
    let message = match error {
        ProtocolError::Internal(e) => {
            tracing::error!("Internal error: {e}");
            "An internal error occurred".to_string()
        }
        ProtocolError::Cryptography { message } => {
            tracing::error!("Cryptography error: {message}");
            "An internal error occurred".to_string()
        }
        other => other.to_string(),
    };
    RpcResponse::failure(id, error.error_code(), &message)
}

async fn dispatch(state: &AppState, caller: &Caller, call: RpcCall) -> ProtocolResult<Value> {
    debug!(method = %call.method, peer = %caller.peer, external = caller.external, "dispatching rpc call");
    let peer = &caller.peer;

    match call.method.as_str() {
        methods::ENCRYPTION_CREATE_CHANNEL => {
            let p: params::CreateChannelParams = parse(call.parameters)?;
            let uuid = state
                .protocol
                .create_channel(
                    peer,
                    CreateChannelRequest {
                        receiving_peer: p.receiving_peer.parse()?,
                        signature_uuid: p.signature_uuid,
                        public_signing_key: p.public_signing_key,
                        public_encryption_key: p.public_encryption_key,
                        transport_algorithm: p.transport_algorithm,
                        channel_uuid: p.channel_uuid,
                    },
                )
                .await?;
            Ok(json!({ "channel_uuid": uuid }))
        }
        methods::ENCRYPTION_ACCEPT_CHANNEL => {
            let p: params::AcceptChannelParams = parse(call.parameters)?;
            state
                .protocol
                .accept_channel(
                    peer,
                    p.channel_uuid,
                    ReceiverKeys {
                        signature_uuid: p.signature_uuid,
                        public_signing_key: p.public_signing_key,
                        public_encryption_key: p.public_encryption_key,
                        transport_encryption_key: p.transport_encryption_key,
                    },
                )
                .await?;
            Ok(json!(true))
        }
        methods::ENCRYPTION_DECLINE_CHANNEL => {
            let p: params::ChannelUuidParams = parse(call.parameters)?;
            state.protocol.decline_channel(peer, p.channel_uuid, false).await?;
            Ok(json!(true))
        }
        methods::ENCRYPTION_DELETE_CHANNEL => {
            let p: params::ChannelUuidParams = parse(call.parameters)?;
            state.protocol.delete_channel(peer, p.channel_uuid).await?;
            Ok(json!(true))
        }
        methods::ENCRYPTION_GET_CHANNEL => {
            let p: params::ChannelUuidParams = parse(call.parameters)?;
            let channel = state.protocol.get_channel(peer, p.channel_uuid).await?;
            Ok(serde_json::to_value(channel).map_err(|e| ProtocolError::Internal(e.into()))?)
        }
        methods::ENCRYPTION_CHANNEL_EXISTS => {
            let p: params::ChannelUuidParams = parse(call.parameters)?;
            let exists = state.protocol.channel_exists(p.channel_uuid).await?;
            Ok(json!(exists))
        }
        methods::ENCRYPTION_GET_CHANNELS => {
            let p: params::PageParams = parse(call.parameters)?;
            let channels = state.protocol.get_channels(peer, p.page, p.limit).await?;
            Ok(serde_json::to_value(channels).map_err(|e| ProtocolError::Internal(e.into()))?)
        }
        methods::ENCRYPTION_GET_CHANNEL_REQUESTS => {
            let p: params::PageParams = parse(call.parameters)?;
            let requests = state.protocol.get_channel_requests(peer, p.page, p.limit).await?;
            Ok(serde_json::to_value(requests).map_err(|e| ProtocolError::Internal(e.into()))?)
        }
        methods::ENCRYPTION_CHANNEL_SEND => {
            let p: params::ChannelSendParams = parse(call.parameters)?;
            let uuid = state
                .protocol
                .send_message(peer, p.channel_uuid, p.checksum, p.data, p.message_uuid, p.timestamp)
                .await?;
            Ok(json!({ "message_uuid": uuid }))
        }
        methods::ENCRYPTION_CHANNEL_RECEIVE => {
            let p: params::ChannelReceiveParams = parse(call.parameters)?;
            let messages = state
                .protocol
                .receive_messages(peer, p.channel_uuid, p.acknowledge)
                .await?;
            Ok(serde_json::to_value(messages).map_err(|e| ProtocolError::Internal(e.into()))?)
        }
        methods::ENCRYPTION_CHANNEL_ACKNOWLEDGE => {
            let p: params::ChannelAcknowledgeParams = parse(call.parameters)?;
            match (p.message_uuid, p.message_uuids) {
                (Some(uuid), None) => {
                    state.protocol.acknowledge_message(peer, p.channel_uuid, uuid).await?;
                }
                (None, Some(uuids)) => {
                    state
                        .protocol
                        .acknowledge_messages(peer, p.channel_uuid, &uuids)
                        .await?;
                }
                _ => {
                    return Err(ProtocolError::Validation {
                        message: "provide exactly one of message_uuid or message_uuids".into(),
                    });
                }
            }
            Ok(json!(true))
        }
        other => Err(ProtocolError::NotFound { resource: format!("rpc method '{other}'") }),
    }
}

fn parse<T: serde::de::DeserializeOwned + validator::Validate>(
    parameters: Value,
) -> ProtocolResult<T> {
    let parsed: T = serde_json::from_value(parameters)
        .map_err(|e| ProtocolError::Validation { message: format!("invalid parameters: {e}") })?;
    socialbox_common::validation::validate_request(&parsed)?;
    Ok(parsed)
}
