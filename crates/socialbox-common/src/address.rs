//! Peer addressing — `username@domain`.
//!
//! A peer address identifies an account on a specific server. The domain is
//! case-insensitive per DNS rules and is normalised to lowercase at
//! construction; the username is compared exactly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Username reserved for a server acting as a peer in server-to-server calls.
pub const HOST_USERNAME: &str = "host";

const MAX_USERNAME_LEN: usize = 255;
const MAX_DOMAIN_LEN: usize = 255;

/// An addressable account, `username@domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    username: String,
    domain: String,
}

impl PeerAddress {
    /// Build an address from parts, validating and normalising the domain.
    pub fn new(username: &str, domain: &str) -> Result<Self, ProtocolError> {
        if username.is_empty() || username.len() > MAX_USERNAME_LEN {
            return Err(ProtocolError::Validation {
                message: "username must be 1-255 characters".into(),
            });
        }
        if username.contains('@') || username.chars().any(char::is_whitespace) {
            return Err(ProtocolError::Validation {
                message: "username must not contain '@' or whitespace".into(),
            });
        }
        if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
            return Err(ProtocolError::Validation {
                message: "domain must be 1-255 characters".into(),
            });
        }
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':')
        {
            return Err(ProtocolError::Validation {
                message: format!("invalid domain '{domain}'"),
            });
        }
        Ok(Self { username: username.to_owned(), domain: domain.to_ascii_lowercase() })
    }

    /// The server-as-peer address (`host@domain`) for a given domain.
    pub fn host(domain: &str) -> Result<Self, ProtocolError> {
        Self::new(HOST_USERNAME, domain)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Lowercased home domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether this peer's home server differs from `local_domain`.
    pub fn is_external(&self, local_domain: &str) -> bool {
        !self.domain.eq_ignore_ascii_case(local_domain)
    }

    pub fn is_host(&self) -> bool {
        self.username == HOST_USERNAME
    }
}

impl FromStr for PeerAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (username, domain) = s.split_once('@').ok_or_else(|| ProtocolError::Validation {
            message: format!("'{s}' is not a valid peer address"),
        })?;
        Self::new(username, domain)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.domain)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.to_string()
    }
}
