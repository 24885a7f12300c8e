//! Resolved server records produced by DNS discovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A remote server's discovered RPC endpoint and trusted signing key.
///
/// Cached keyed by domain; a row is stale once `now > expires_at` and must
/// be re-resolved. Never shared across domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedServer {
    pub rpc_endpoint: Url,
    /// `sig:`-prefixed base64url Ed25519 public key, as published in DNS.
    pub public_signing_key: String,
    pub expires_at: DateTime<Utc>,
}

impl ResolvedServer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
