//! Cryptography-specific error types.

use socialbox_common::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptographyError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Structurally invalid signature")]
    InvalidSignature,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

impl From<CryptographyError> for ProtocolError {
    fn from(e: CryptographyError) -> Self {
        match e {
            CryptographyError::UnsupportedAlgorithm(algorithm) => {
                ProtocolError::UnsupportedAlgorithm { algorithm }
            }
            other => ProtocolError::Cryptography { message: other.to_string() },
        }
    }
}
