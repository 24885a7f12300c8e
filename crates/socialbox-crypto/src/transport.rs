//! Transport encryption algorithm negotiation.
//!
//! The server never encrypts channel traffic itself; it only validates that
//! the algorithm a caller requests is one it knows, and that exchanged
//! transport keys are well-formed for it. All supported algorithms use
//! 32-byte keys.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use rand::RngCore;
use rand_core::OsRng;

use crate::error::CryptographyError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

const TRANSPORT_KEY_LEN: usize = 32;

/// Symmetric algorithms peers may negotiate for channel payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAlgorithm {
    Xchacha20,
    Chacha20,
    Aes256Gcm,
}

impl TransportAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xchacha20 => "xchacha20",
            Self::Chacha20 => "chacha20",
            Self::Aes256Gcm => "aes256gcm",
        }
    }
}

impl fmt::Display for TransportAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportAlgorithm {
    type Err = CryptographyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xchacha20" => Ok(Self::Xchacha20),
            "chacha20" => Ok(Self::Chacha20),
            // Some clients spell this one with hyphens.
            "aes256gcm" | "aes-256-gcm" => Ok(Self::Aes256Gcm),
            other => Err(CryptographyError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Generate a fresh transport key, base64url-encoded without padding.
pub fn generate_transport_key(_algorithm: TransportAlgorithm) -> String {
    let mut key = [0u8; TRANSPORT_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    B64.encode(key)
}

/// Check that an encoded transport key is valid for the given algorithm.
pub fn validate_transport_key(key: &str, _algorithm: TransportAlgorithm) -> bool {
    B64.decode(key).map(|bytes| bytes.len() == TRANSPORT_KEY_LEN).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_algorithms() {
        for name in ["xchacha20", "chacha20", "aes256gcm"] {
            let alg: TransportAlgorithm = name.parse().unwrap();
            assert_eq!(alg.to_string(), name);
        }
    }

    #[test]
    fn rejects_unknown_algorithms() {
        assert!(matches!(
            "rot13".parse::<TransportAlgorithm>(),
            Err(CryptographyError::UnsupportedAlgorithm(_))
        ));
        // Case-sensitive on purpose.
        assert!("XChaCha20".parse::<TransportAlgorithm>().is_err());
    }

    #[test]
    fn hyphenated_aes_alias() {
        assert_eq!(
            "aes-256-gcm".parse::<TransportAlgorithm>().unwrap(),
            TransportAlgorithm::Aes256Gcm
        );
    }

    #[test]
    fn generated_keys_validate() {
        for alg in [
            TransportAlgorithm::Xchacha20,
            TransportAlgorithm::Chacha20,
            TransportAlgorithm::Aes256Gcm,
        ] {
            let key = generate_transport_key(alg);
            assert!(validate_transport_key(&key, alg));
        }
    }

    #[test]
    fn rejects_bad_keys() {
        let alg = TransportAlgorithm::Xchacha20;
        assert!(!validate_transport_key("", alg));
        assert!(!validate_transport_key("not base64!!", alg));
        assert!(!validate_transport_key(&B64.encode([0u8; 16]), alg));
    }
}
