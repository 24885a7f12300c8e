//! RPC wire envelope shared by the inbound front door and the outbound
//! federation client.
//!
//! Requests are JSON objects `{ "id": …, "method": …, "parameters": … }`
//! POSTed to a server's RPC endpoint, singly or as a batch array. Responses
//! echo the request id and carry either a `result` or an `error` with a
//! stable machine-readable code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version every client must declare in the `Client-Version` header.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Standard header names used on every RPC call.
pub mod headers {
    pub const CLIENT_NAME: &str = "Client-Name";
    pub const CLIENT_VERSION: &str = "Client-Version";
    pub const SESSION_UUID: &str = "Session-UUID";
    pub const SIGNATURE: &str = "Signature";
    pub const IDENTIFY_AS: &str = "Identify-As";
}

/// RPC method names exposed and consumed by the encryption channel core.
pub mod methods {
    pub const ENCRYPTION_CREATE_CHANNEL: &str = "EncryptionCreateChannel";
    pub const ENCRYPTION_ACCEPT_CHANNEL: &str = "EncryptionAcceptChannel";
    pub const ENCRYPTION_DECLINE_CHANNEL: &str = "EncryptionDeclineChannel";
    pub const ENCRYPTION_DELETE_CHANNEL: &str = "EncryptionDeleteChannel";
    pub const ENCRYPTION_GET_CHANNEL: &str = "EncryptionGetChannel";
    pub const ENCRYPTION_CHANNEL_EXISTS: &str = "EncryptionChannelExists";
    pub const ENCRYPTION_GET_CHANNELS: &str = "EncryptionGetChannels";
    pub const ENCRYPTION_GET_CHANNEL_REQUESTS: &str = "EncryptionGetChannelRequests";
    pub const ENCRYPTION_CHANNEL_SEND: &str = "EncryptionChannelSend";
    pub const ENCRYPTION_CHANNEL_RECEIVE: &str = "EncryptionChannelReceive";
    pub const ENCRYPTION_CHANNEL_ACKNOWLEDGE: &str = "EncryptionChannelAcknowledge";
}

/// Parameter shapes for the encryption channel methods, shared by the
/// inbound dispatcher and the outbound federation client so the two ends of
/// a mirrored call cannot drift apart.
pub mod params {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;
    use validator::Validate;

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    pub struct CreateChannelParams {
        /// `username@domain` of the peer being invited.
        #[validate(length(min = 3, max = 320, message = "Invalid receiving peer address"))]
        pub receiving_peer: String,
        pub signature_uuid: Uuid,
        #[validate(length(min = 1, message = "Public signing key is required"))]
        pub public_signing_key: String,
        #[validate(length(min = 1, message = "Public encryption key is required"))]
        pub public_encryption_key: String,
        #[validate(length(min = 1, message = "Transport algorithm is required"))]
        pub transport_algorithm: String,
        /// Pinned by the initiating server on mirrored calls.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub channel_uuid: Option<Uuid>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    pub struct AcceptChannelParams {
        pub channel_uuid: Uuid,
        pub signature_uuid: Uuid,
        #[validate(length(min = 1, message = "Public signing key is required"))]
        pub public_signing_key: String,
        #[validate(length(min = 1, message = "Public encryption key is required"))]
        pub public_encryption_key: String,
        /// Transport key sealed to the initiator's encryption key.
        #[validate(length(min = 1, message = "Transport encryption key is required"))]
        pub transport_encryption_key: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    pub struct ChannelUuidParams {
        pub channel_uuid: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    pub struct PageParams {
        #[serde(default = "default_page")]
        pub page: u32,
        #[serde(default = "default_limit")]
        pub limit: u32,
    }

    fn default_page() -> u32 {
        1
    }

    fn default_limit() -> u32 {
        100
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    pub struct ChannelSendParams {
        pub channel_uuid: Uuid,
        #[validate(length(equal = 128, message = "Checksum must be a SHA-512 hex digest"))]
        pub checksum: String,
        #[validate(length(min = 1, message = "Message data is required"))]
        pub data: String,
        /// Pinned by the sending server on mirrored calls.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub message_uuid: Option<Uuid>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "chrono::serde::ts_seconds_option"
        )]
        pub timestamp: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    pub struct ChannelReceiveParams {
        pub channel_uuid: Uuid,
        #[serde(default)]
        pub acknowledge: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Validate)]
    pub struct ChannelAcknowledgeParams {
        pub channel_uuid: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub message_uuid: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub message_uuids: Option<Vec<Uuid>>,
    }
}

/// A single RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCall {
    /// Caller-chosen correlation id, echoed in the response.
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub parameters: Value,
}

impl RpcCall {
    pub fn new(method: &str, parameters: Value) -> Self {
        Self { id: uuid::Uuid::new_v4().simple().to_string(), method: method.to_owned(), parameters }
    }
}

/// Error payload carried in a failed RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Stable machine-readable code (see `ProtocolError::error_code`).
    pub code: String,
    pub message: String,
}

/// A single RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn success(id: &str, result: Value) -> Self {
        Self { id: id.to_owned(), result: Some(result), error: None }
    }

    pub fn failure(id: &str, code: &str, message: &str) -> Self {
        Self {
            id: id.to_owned(),
            result: None,
            error: Some(RpcErrorBody { code: code.to_owned(), message: message.to_owned() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_round_trips() {
        let resp = RpcResponse::success("abc", json!({"uuid": "x"}));
        let encoded = serde_json::to_string(&resp).unwrap();
        assert!(!encoded.contains("error"));
        let decoded: RpcResponse = serde_json::from_str(&encoded).unwrap();
        assert!(decoded.is_success());
        assert_eq!(decoded.id, "abc");
    }

    #[test]
    fn failure_carries_code() {
        let resp = RpcResponse::failure("abc", "UUID_MISMATCH", "uuid disagreement");
        assert!(!resp.is_success());
        assert_eq!(resp.error.unwrap().code, "UUID_MISMATCH");
    }
}
