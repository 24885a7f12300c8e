//! # socialbox-crypto
//!
//! The Signature Authority: Ed25519 signing key pairs, temporal (time-window
//! bound) signatures for replay-resistant request authentication, X25519
//! sealed payloads for bootstrapping transport keys, and transport-key
//! generation/validation.
//!
//! Key encoding convention (shared with the DNS discovery record and every
//! wire surface): keys are base64url without padding, prefixed with their
//! type — `sig:` for Ed25519 signing keys, `enc:` for X25519 encryption
//! keys. Signatures and ciphertexts are bare base64url.

pub mod error;
pub mod hash;
pub mod keys;
pub mod sealed;
pub mod temporal;
pub mod transport;

pub use error::CryptographyError;
pub use keys::{EncryptionKeyPair, SigningKeyPair};
pub use transport::TransportAlgorithm;
