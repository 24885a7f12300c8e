//! Client session records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::PeerAddress;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Active,
    Expired,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "CLOSED" => Ok(Self::Closed),
            other => Err(ProtocolError::Internal(anyhow::anyhow!(
                "unknown persisted session state '{other}'"
            ))),
        }
    }
}

/// A client session bound to a public signing key.
///
/// Created unauthenticated with only the client-supplied key; later bound to
/// a peer identity. Signed requests verify against `bound_public_key` before
/// authentication and against the peer's registered key after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub uuid: Uuid,
    /// `sig:`-prefixed public key the client presented at session creation.
    pub bound_public_key: String,
    pub peer: Option<PeerAddress>,
    pub authenticated: bool,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_usable(&self) -> bool {
        self.state == SessionState::Active
    }
}
