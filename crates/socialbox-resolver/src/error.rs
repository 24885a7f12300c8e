//! Resolution error types.

use socialbox_common::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// No usable discovery record exists for the domain.
    #[error("No discovery record found for domain '{0}'")]
    NotFound(String),

    /// The DNS lookup itself failed (network, NXDOMAIN, servfail).
    #[error("DNS lookup failed for domain '{domain}': {message}")]
    Dns { domain: String, message: String },

    /// A record matched the `v=socialbox` tag but not the grammar.
    /// Permanent for this lookup; never retried in-process.
    #[error("Malformed discovery record for domain '{domain}': {message}")]
    MalformedRecord { domain: String, message: String },
}

impl From<ResolutionError> for ProtocolError {
    fn from(e: ResolutionError) -> Self {
        match e {
            ResolutionError::NotFound(domain) => ProtocolError::NotFound {
                resource: format!("server record for '{domain}'"),
            },
            other => ProtocolError::Federation { message: other.to_string() },
        }
    }
}
