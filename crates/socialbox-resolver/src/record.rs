//! Discovery record grammar.
//!
//! A server publishes one TXT record on its domain:
//!
//! ```text
//! v=socialbox;sb-rpc=<https-url>;sb-key=<sig:base64url-key>;sb-exp=<unix-seconds>
//! ```
//!
//! `sb-exp=0` means the record never expires on its own; the local cache TTL
//! still applies. When a record repeats a field, the first occurrence wins.

use chrono::{DateTime, TimeZone, Utc};
use url::Url;

use crate::error::ResolutionError;

/// Leading tag identifying a Socialbox TXT record.
pub const RECORD_TAG: &str = "v=socialbox";

const FIELD_RPC: &str = "sb-rpc";
const FIELD_KEY: &str = "sb-key";
const FIELD_EXP: &str = "sb-exp";

/// A parsed `v=socialbox` TXT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    pub rpc_endpoint: Url,
    pub public_signing_key: String,
    /// `None` when the record carries `sb-exp=0` (or omits the field).
    pub expires_at: Option<DateTime<Utc>>,
}

impl DiscoveryRecord {
    /// Parse a TXT record value. `domain` is only used for error context.
    pub fn parse(value: &str, domain: &str) -> Result<Self, ResolutionError> {
        let malformed = |message: String| ResolutionError::MalformedRecord {
            domain: domain.to_string(),
            message,
        };

        let value = value.trim();
        if !value.starts_with(RECORD_TAG) {
            return Err(malformed(format!("record does not start with '{RECORD_TAG}'")));
        }

        let mut rpc: Option<&str> = None;
        let mut key: Option<&str> = None;
        let mut exp: Option<&str> = None;

        for field in value.split(';').skip(1) {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let Some((name, field_value)) = field.split_once('=') else {
                return Err(malformed(format!("field '{field}' is not 'name=value'")));
            };
            // First occurrence of each field wins.
            match name.trim() {
                FIELD_RPC => rpc.get_or_insert(field_value.trim()),
                FIELD_KEY => key.get_or_insert(field_value.trim()),
                FIELD_EXP => exp.get_or_insert(field_value.trim()),
                _ => continue,
            };
        }

        let rpc = rpc.ok_or_else(|| malformed(format!("missing required field '{FIELD_RPC}'")))?;
        let key = key.ok_or_else(|| malformed(format!("missing required field '{FIELD_KEY}'")))?;

        let rpc_endpoint = Url::parse(rpc)
            .map_err(|e| malformed(format!("invalid '{FIELD_RPC}' url: {e}")))?;
        if key.is_empty() {
            return Err(malformed(format!("empty '{FIELD_KEY}' field")));
        }

        let expires_at = match exp {
            None => None,
            Some(raw) => {
                let secs: i64 = raw
                    .parse()
                    .map_err(|_| malformed(format!("invalid '{FIELD_EXP}' value '{raw}'")))?;
                if secs == 0 {
                    None
                } else {
                    Some(
                        Utc.timestamp_opt(secs, 0)
                            .single()
                            .ok_or_else(|| malformed(format!("'{FIELD_EXP}' out of range")))?,
                    )
                }
            }
        };

        Ok(Self {
            rpc_endpoint,
            public_signing_key: key.to_string(),
            expires_at,
        })
    }

    /// Render the TXT record value a server operator should publish.
    pub fn generate(rpc_endpoint: &Url, public_signing_key: &str, expires_at_unix: i64) -> String {
        format!(
            "{RECORD_TAG};{FIELD_RPC}={rpc_endpoint};{FIELD_KEY}={public_signing_key};{FIELD_EXP}={expires_at_unix}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_record() {
        let rec = DiscoveryRecord::parse(
            "v=socialbox;sb-rpc=https://rpc.example.org/;sb-key=sig:AAAA;sb-exp=1700000000",
            "example.org",
        )
        .unwrap();
        assert_eq!(rec.rpc_endpoint.as_str(), "https://rpc.example.org/");
        assert_eq!(rec.public_signing_key, "sig:AAAA");
        assert_eq!(rec.expires_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn exp_zero_means_no_expiry() {
        let rec = DiscoveryRecord::parse(
            "v=socialbox;sb-rpc=https://rpc.example.org;sb-key=sig:AAAA;sb-exp=0",
            "example.org",
        )
        .unwrap();
        assert!(rec.expires_at.is_none());
    }

    #[test]
    fn first_occurrence_wins_per_field() {
        let rec = DiscoveryRecord::parse(
            "v=socialbox;sb-rpc=https://a.example.org;sb-key=sig:first;sb-rpc=https://b.example.org;sb-key=sig:second",
            "example.org",
        )
        .unwrap();
        assert_eq!(rec.rpc_endpoint.host_str(), Some("a.example.org"));
        assert_eq!(rec.public_signing_key, "sig:first");
    }

    #[test]
    fn missing_required_field_fails() {
        let err = DiscoveryRecord::parse("v=socialbox;sb-key=sig:AAAA", "example.org").unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedRecord { .. }));
        assert!(DiscoveryRecord::parse("v=socialbox;sb-rpc=https://x.org", "x.org").is_err());
    }

    #[test]
    fn rejects_non_socialbox_and_bad_grammar() {
        assert!(DiscoveryRecord::parse("v=spf1 -all", "x.org").is_err());
        assert!(DiscoveryRecord::parse(
            "v=socialbox;sb-rpc=not a url;sb-key=sig:AAAA",
            "x.org"
        )
        .is_err());
        assert!(DiscoveryRecord::parse(
            "v=socialbox;sb-rpc=https://x.org;sb-key=sig:A;sb-exp=soon",
            "x.org"
        )
        .is_err());
    }

    #[test]
    fn generate_round_trips() {
        let url = Url::parse("https://rpc.example.org/").unwrap();
        let value = DiscoveryRecord::generate(&url, "sig:AAAA", 1_700_000_000);
        let rec = DiscoveryRecord::parse(&value, "example.org").unwrap();
        assert_eq!(rec.rpc_endpoint, url);
        assert_eq!(rec.public_signing_key, "sig:AAAA");
    }
}
