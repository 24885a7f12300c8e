//! Ed25519 signing keys and X25519 encryption keys.
//!
//! All keys cross the wire as `<type>:<base64url-no-pad>` strings; the type
//! prefix (`sig:` / `enc:`) guards against a signing key being used where an
//! encryption key is expected and vice versa. Validation helpers return
//! `bool` and swallow format errors — a malformed key is simply invalid,
//! not an exceptional condition.

use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::CryptographyError;
use crate::hash::sha512_hex;

/// Prefix on Ed25519 signing keys.
pub const SIGNING_PREFIX: &str = "sig:";
/// Prefix on X25519 encryption keys.
pub const ENCRYPTION_PREFIX: &str = "enc:";

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

// ============================================================================
// Signing key pair
// ============================================================================

/// An Ed25519 signing key pair.
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a brand-new random key pair.
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::generate(&mut OsRng) }
    }

    /// Reconstruct a key pair from raw 32-byte seed bytes (as persisted).
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptographyError> {
        let bytes: [u8; 32] = seed
            .try_into()
            .map_err(|_| CryptographyError::InvalidKey("seed must be exactly 32 bytes".into()))?;
        Ok(Self { signing_key: SigningKey::from_bytes(&bytes) })
    }

    /// Reconstruct from a `sig:`-prefixed encoded private key.
    pub fn from_encoded(private_key: &str) -> Result<Self, CryptographyError> {
        let seed = decode_key(private_key, SIGNING_PREFIX)?;
        Self::from_seed(&seed)
    }

    /// The 32-byte seed for persistence.
    pub fn seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The `sig:`-prefixed public key.
    pub fn public_key(&self) -> String {
        encode_key(self.signing_key.verifying_key().as_bytes(), SIGNING_PREFIX)
    }

    /// The `sig:`-prefixed private key (seed) for export.
    pub fn private_key(&self) -> String {
        encode_key(&self.seed_bytes(), SIGNING_PREFIX)
    }

    /// Sign content, returning a base64url signature.
    ///
    /// With `hash_first` the content is SHA-512 pre-hashed before signing;
    /// kept for compatibility with callers that sign large bodies by hash.
    pub fn sign(&self, content: &[u8], hash_first: bool) -> String {
        let sig = if hash_first {
            self.signing_key.sign(sha512_hex(content).as_bytes())
        } else {
            self.signing_key.sign(content)
        };
        B64.encode(sig.to_bytes())
    }
}

/// Verify an Ed25519 signature.
///
/// Returns `Ok(false)` on a mismatch; errors only when the key or signature
/// is structurally invalid.
pub fn verify(
    content: &[u8],
    signature: &str,
    public_key: &str,
    hash_first: bool,
) -> Result<bool, CryptographyError> {
    let key = parse_verifying_key(public_key)?;
    let sig_bytes = B64
        .decode(signature)
        .map_err(|_| CryptographyError::InvalidSignature)?;
    let sig_bytes: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptographyError::InvalidSignature)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    let ok = if hash_first {
        key.verify(sha512_hex(content).as_bytes(), &signature).is_ok()
    } else {
        key.verify(content, &signature).is_ok()
    };
    Ok(ok)
}

/// Structural check on a `sig:`-prefixed public signing key.
pub fn validate_public_signing_key(public_key: &str) -> bool {
    parse_verifying_key(public_key).is_ok()
}

/// Structural check on a `sig:`-prefixed private signing key.
pub fn validate_private_signing_key(private_key: &str) -> bool {
    SigningKeyPair::from_encoded(private_key).is_ok()
}

pub(crate) fn parse_verifying_key(public_key: &str) -> Result<VerifyingKey, CryptographyError> {
    let bytes = decode_key(public_key, SIGNING_PREFIX)?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptographyError::InvalidKey("signing key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| CryptographyError::InvalidKey("not a valid Ed25519 point".into()))
}

// ============================================================================
// Encryption key pair
// ============================================================================

/// An X25519 key pair used for sealing small control payloads
/// (e.g. the transport key exchanged on channel accept).
pub struct EncryptionKeyPair {
    secret: StaticSecret,
}

impl EncryptionKeyPair {
    pub fn generate() -> Self {
        Self { secret: StaticSecret::random_from_rng(OsRng) }
    }

    /// Reconstruct from an `enc:`-prefixed encoded private key.
    pub fn from_encoded(private_key: &str) -> Result<Self, CryptographyError> {
        let bytes = decode_key(private_key, ENCRYPTION_PREFIX)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptographyError::InvalidKey("encryption key must be 32 bytes".into()))?;
        Ok(Self { secret: StaticSecret::from(bytes) })
    }

    pub fn public_key(&self) -> String {
        encode_key(X25519Public::from(&self.secret).as_bytes(), ENCRYPTION_PREFIX)
    }

    pub fn private_key(&self) -> String {
        encode_key(&self.secret.to_bytes(), ENCRYPTION_PREFIX)
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

/// Structural check on an `enc:`-prefixed public encryption key.
pub fn validate_public_encryption_key(public_key: &str) -> bool {
    parse_encryption_key(public_key).is_ok()
}

pub(crate) fn parse_encryption_key(public_key: &str) -> Result<X25519Public, CryptographyError> {
    let bytes = decode_key(public_key, ENCRYPTION_PREFIX)?;
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptographyError::InvalidKey("encryption key must be 32 bytes".into()))?;
    Ok(X25519Public::from(bytes))
}

// ============================================================================
// Encoding helpers
// ============================================================================

fn encode_key(bytes: &[u8], prefix: &str) -> String {
    format!("{prefix}{}", B64.encode(bytes))
}

fn decode_key(key: &str, prefix: &str) -> Result<Vec<u8>, CryptographyError> {
    let b64 = key
        .strip_prefix(prefix)
        .ok_or_else(|| CryptographyError::InvalidKey(format!("expected '{prefix}' key")))?;
    if b64.is_empty() {
        return Err(CryptographyError::InvalidKey("empty key after type prefix".into()));
    }
    B64.decode(b64)
        .map_err(|_| CryptographyError::InvalidKey("invalid base64url key encoding".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_round_trip() {
        let kp = SigningKeyPair::generate();
        let msg = b"channel accept assertion";
        let sig = kp.sign(msg, false);
        assert!(verify(msg, &sig, &kp.public_key(), false).unwrap());
        assert!(!verify(b"tampered", &sig, &kp.public_key(), false).unwrap());
    }

    #[test]
    fn prehashed_signatures_are_distinct_but_verify() {
        let kp = SigningKeyPair::generate();
        let msg = b"large request body".as_slice();
        let plain = kp.sign(msg, false);
        let hashed = kp.sign(msg, true);
        assert_ne!(plain, hashed);
        assert!(verify(msg, &hashed, &kp.public_key(), true).unwrap());
        assert!(!verify(msg, &hashed, &kp.public_key(), false).unwrap());
    }

    #[test]
    fn from_seed_is_stable() {
        let kp1 = SigningKeyPair::generate();
        let kp2 = SigningKeyPair::from_seed(&kp1.seed_bytes()).unwrap();
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn encoded_private_key_round_trips() {
        let kp1 = SigningKeyPair::generate();
        let kp2 = SigningKeyPair::from_encoded(&kp1.private_key()).unwrap();
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn mismatch_returns_false_garbage_errors() {
        let kp = SigningKeyPair::generate();
        let sig = kp.sign(b"msg", false);

        // Wrong key: clean false.
        let other = SigningKeyPair::generate();
        assert!(!verify(b"msg", &sig, &other.public_key(), false).unwrap());

        // Structurally broken inputs: error, not false.
        assert!(verify(b"msg", "???", &kp.public_key(), false).is_err());
        assert!(verify(b"msg", &sig, "sig:short", false).is_err());
        assert!(verify(b"msg", &sig, "enc:AAAA", false).is_err());
    }

    #[test]
    fn key_validation_swallows_format_errors() {
        let kp = SigningKeyPair::generate();
        assert!(validate_public_signing_key(&kp.public_key()));
        assert!(validate_private_signing_key(&kp.private_key()));
        assert!(!validate_public_signing_key("sig:"));
        assert!(!validate_public_signing_key("not-a-key"));
        assert!(!validate_public_signing_key(&kp.public_key().replace("sig:", "enc:")));

        let ekp = EncryptionKeyPair::generate();
        assert!(validate_public_encryption_key(&ekp.public_key()));
        assert!(!validate_public_encryption_key(&ekp.public_key().replace("enc:", "sig:")));
    }
}
