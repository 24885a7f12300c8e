//! Input validation utilities.
//!
//! Centralized validation helpers used across RPC method handlers.

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::error::ProtocolError;

/// Validate a request parameter struct, returning a
/// `ProtocolError::Validation` on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), ProtocolError> {
    body.validate().map_err(|e| ProtocolError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Whether a string is a SHA-512 hex digest (128 hex characters).
pub fn is_sha512_hex(checksum: &str) -> bool {
    checksum.len() == 128 && checksum.chars().all(|c| c.is_ascii_hexdigit())
}

/// Whether a timestamp falls within `tolerance_secs` of now, either way.
pub fn is_timestamp_in_range(ts: DateTime<Utc>, tolerance_secs: i64) -> bool {
    (Utc::now() - ts).num_seconds().abs() <= tolerance_secs
}

/// Validate pagination arguments against a configured cap.
pub fn validate_page(page: u32, limit: u32, max_limit: u32) -> Result<(), ProtocolError> {
    if page < 1 {
        return Err(ProtocolError::Validation {
            message: "page number cannot be less than 1".into(),
        });
    }
    if limit < 1 {
        return Err(ProtocolError::Validation { message: "limit cannot be less than 1".into() });
    }
    if limit > max_limit {
        return Err(ProtocolError::Validation {
            message: format!("limit cannot exceed {max_limit}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn sha512_hex_length_and_charset() {
        let good = "a".repeat(128);
        assert!(is_sha512_hex(&good));
        assert!(!is_sha512_hex(&"a".repeat(127)));
        assert!(!is_sha512_hex(&"g".repeat(128)));
    }

    #[test]
    fn timestamp_range() {
        let now = Utc::now();
        assert!(is_timestamp_in_range(now, 60));
        assert!(is_timestamp_in_range(now - Duration::seconds(59), 60));
        assert!(!is_timestamp_in_range(now - Duration::seconds(3700), 3600));
    }

    #[test]
    fn page_limits() {
        assert!(validate_page(1, 100, 100).is_ok());
        assert!(validate_page(0, 10, 100).is_err());
        assert!(validate_page(1, 0, 100).is_err());
        assert!(validate_page(1, 101, 100).is_err());
    }
}
