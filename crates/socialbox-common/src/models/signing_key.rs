//! Registered peer signing keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::PeerAddress;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningKeyState {
    Active,
    Expired,
    Revoked,
}

impl SigningKeyState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for SigningKeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningKeyState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED" => Ok(Self::Revoked),
            other => Err(ProtocolError::Internal(anyhow::anyhow!(
                "unknown persisted signing key state '{other}'"
            ))),
        }
    }
}

/// A signing key registered by a peer.
///
/// A peer may register multiple keys up to a configured maximum; keys verify
/// signatures on channel operations when the acting party is not the
/// channel's original caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeyRecord {
    pub uuid: Uuid,
    pub peer: PeerAddress,
    /// `sig:`-prefixed base64url Ed25519 public key.
    pub public_key: String,
    pub name: Option<String>,
    pub state: SigningKeyState,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SigningKeyRecord {
    /// Whether the key may be used for verification right now.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.state == SigningKeyState::Active
            && self.expires_at.map_or(true, |exp| now <= exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(state: SigningKeyState, expires_at: Option<DateTime<Utc>>) -> SigningKeyRecord {
        SigningKeyRecord {
            uuid: Uuid::new_v4(),
            peer: "alice@example.com".parse().unwrap(),
            public_key: "sig:AAAA".into(),
            name: None,
            state,
            expires_at,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn usability_respects_state_and_expiry() {
        let now = Utc::now();
        assert!(record(SigningKeyState::Active, None).is_usable(now));
        assert!(record(SigningKeyState::Active, Some(now + Duration::hours(1))).is_usable(now));
        assert!(!record(SigningKeyState::Active, Some(now - Duration::hours(1))).is_usable(now));
        assert!(!record(SigningKeyState::Revoked, None).is_usable(now));
        assert!(!record(SigningKeyState::Expired, None).is_usable(now));
    }
}
