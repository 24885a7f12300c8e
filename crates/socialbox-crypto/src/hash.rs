//! Content hashing helpers.

use sha2::{Digest, Sha512};

/// SHA-512 hex digest of arbitrary bytes.
///
/// Used for message checksums and for the request-body hash that temporal
/// signatures are computed over.
pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}
