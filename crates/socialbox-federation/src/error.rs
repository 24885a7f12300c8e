//! Outbound RPC error types.

use socialbox_common::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    /// The request never completed (connect failure, timeout, TLS).
    #[error("Transport failure calling {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// Non-2xx HTTP status; carries the raw body when one was present.
    #[error("Remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A well-formed RPC response carrying an error payload.
    #[error("Remote error {code}: {message}")]
    Remote { code: String, message: String },

    /// A 2xx response whose body was not a valid RPC response.
    #[error("Undecodable response body: {0}")]
    Decode(String),

    /// The remote answered 204 where a result was required.
    #[error("Remote returned no content where a result was expected")]
    MissingResult,
}

impl From<RpcError> for ProtocolError {
    fn from(e: RpcError) -> Self {
        ProtocolError::Federation { message: e.to_string() }
    }
}
