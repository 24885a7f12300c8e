//! Temporal signatures — signatures bound to a coarse time window.
//!
//! A temporal signature signs `content|timeBlock` where
//! `timeBlock = floor(unix_now / 60)`. Verification recomputes the current
//! block and walks back `window_count` blocks, accepting the signature if
//! any window matches. This gives replay resistance without a server-side
//! nonce store: a captured signature dies with its window, and the
//! `window_count` knob trades replay resistance for clock-skew tolerance.

use chrono::Utc;

use crate::error::CryptographyError;
use crate::keys::{self, SigningKeyPair};

/// Width of one signature validity window.
pub const TIME_BLOCK_SECS: i64 = 60;

/// Default number of past windows accepted during verification.
pub const DEFAULT_WINDOW_COUNT: u32 = 1;

fn time_block(unix_secs: i64) -> i64 {
    unix_secs.div_euclid(TIME_BLOCK_SECS)
}

fn temporal_message(content: &[u8], block: i64) -> Vec<u8> {
    let mut message = Vec::with_capacity(content.len() + 24);
    message.extend_from_slice(content);
    message.push(b'|');
    message.extend_from_slice(block.to_string().as_bytes());
    message
}

/// Sign `content` bound to the current time window.
pub fn temporal_sign(kp: &SigningKeyPair, content: &[u8]) -> String {
    temporal_sign_at(kp, content, Utc::now().timestamp())
}

/// Verify a temporal signature against the current window and up to
/// `window_count` past windows.
pub fn verify_temporal(
    content: &[u8],
    signature: &str,
    public_key: &str,
    window_count: u32,
) -> Result<bool, CryptographyError> {
    verify_temporal_at(content, signature, public_key, window_count, Utc::now().timestamp())
}

// Explicit-clock variants keep window arithmetic testable without sleeping.

pub fn temporal_sign_at(kp: &SigningKeyPair, content: &[u8], unix_secs: i64) -> String {
    kp.sign(&temporal_message(content, time_block(unix_secs)), false)
}

pub fn verify_temporal_at(
    content: &[u8],
    signature: &str,
    public_key: &str,
    window_count: u32,
    unix_secs: i64,
) -> Result<bool, CryptographyError> {
    let current = time_block(unix_secs);
    for offset in 0..=i64::from(window_count) {
        let message = temporal_message(content, current - offset);
        if keys::verify(&message, signature, public_key, false)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_within_the_signed_window() {
        let kp = SigningKeyPair::generate();
        let t0 = 1_700_000_000;
        let sig = temporal_sign_at(&kp, b"body-hash", t0);
        assert!(verify_temporal_at(b"body-hash", &sig, &kp.public_key(), 1, t0).unwrap());
        assert!(verify_temporal_at(b"body-hash", &sig, &kp.public_key(), 1, t0 + 59).unwrap());
    }

    #[test]
    fn expires_after_window_count_windows() {
        let kp = SigningKeyPair::generate();
        // Align t0 to a block boundary so window arithmetic is exact.
        let t0 = 1_700_000_000 - (1_700_000_000 % TIME_BLOCK_SECS);
        let sig = temporal_sign_at(&kp, b"content", t0);

        // One extra window: still valid just under 2 blocks later.
        assert!(verify_temporal_at(b"content", &sig, &kp.public_key(), 1, t0 + 119).unwrap());
        // Two blocks later the signed window has rolled out of range.
        assert!(!verify_temporal_at(b"content", &sig, &kp.public_key(), 1, t0 + 125).unwrap());
        // A wider window tolerance re-admits it.
        assert!(verify_temporal_at(b"content", &sig, &kp.public_key(), 2, t0 + 125).unwrap());
    }

    #[test]
    fn bound_to_content() {
        let kp = SigningKeyPair::generate();
        let t0 = 1_700_000_000;
        let sig = temporal_sign_at(&kp, b"a", t0);
        assert!(!verify_temporal_at(b"b", &sig, &kp.public_key(), 1, t0).unwrap());
    }

    #[test]
    fn plain_signature_never_verifies_temporally() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"content", false);
        assert!(!verify_temporal_at(b"content", &sig, &kp.public_key(), 1, 1_700_000_000).unwrap());
    }
}
