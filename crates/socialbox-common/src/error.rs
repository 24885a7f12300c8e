//! Centralized error taxonomy for Socialbox.
//!
//! Components raise typed errors; only the RPC boundary maps them to
//! transport-level status codes. Every variant carries a stable
//! machine-readable code for programmatic handling by clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Core error type used across all Socialbox components.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    // === Validation errors — rejected before any state mutation ===
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Unsupported encryption algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    // === Authorization errors ===
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    // === Resource errors ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    // === State-conflict errors ===
    #[error("Operation illegal in current channel state: {message}")]
    StateConflict { message: String },

    #[error("Channel UUID already exists on this server")]
    UuidConflict,

    #[error("Remote server did not agree on the channel UUID")]
    UuidMismatch,

    // === Federation errors ===
    #[error("Federation failure: {message}")]
    Federation { message: String },

    // === Cryptographic errors ===
    #[error("Cryptography error: {message}")]
    Cryptography { message: String },

    // === Infrastructure errors ===
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error body sent to clients.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error: String,
    message: String,
}

impl ProtocolError {
    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. }
            | Self::MissingParameter { .. }
            | Self::UnsupportedAlgorithm { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::StateConflict { .. } | Self::UuidConflict | Self::UuidMismatch => {
                StatusCode::CONFLICT
            }
            Self::Federation { .. } => StatusCode::BAD_GATEWAY,
            Self::Cryptography { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code string for programmatic handling.
    pub fn error_code(&self) -> &str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::MissingParameter { .. } => "MISSING_PARAMETER",
            Self::UnsupportedAlgorithm { .. } => "UNSUPPORTED_ALGORITHM",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::StateConflict { .. } => "STATE_CONFLICT",
            Self::UuidConflict => "UUID_CONFLICT",
            Self::UuidMismatch => "UUID_MISMATCH",
            Self::Federation { .. } => "FEDERATION_ERROR",
            Self::Cryptography { .. } => "CRYPTOGRAPHY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients.
        let message = match &self {
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

        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.error_code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience alias for Results using ProtocolError.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
