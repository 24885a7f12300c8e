//! Sealed control payloads.
//!
//! Small secrets (notably the transport key a receiver hands back on channel
//! accept) are sealed to the recipient's public X25519 key: an ephemeral key
//! pair is generated per payload, a symmetric key is derived from the DH
//! shared secret, and the content is encrypted with XChaCha20-Poly1305.
//! The wire form is `base64url(ephemeral_pub(32) || nonce(24) || ciphertext)`.

use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public};

use crate::error::CryptographyError;
use crate::keys::{self, EncryptionKeyPair};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

const EPHEMERAL_PUB_LEN: usize = 32;
const NONCE_LEN: usize = 24;

/// Seal `content` to an `enc:`-prefixed public encryption key.
pub fn seal(content: &[u8], recipient_public_key: &str) -> Result<String, CryptographyError> {
    let recipient = keys::parse_encryption_key(recipient_public_key)?;

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient);

    let key = derive_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient.as_bytes());
    let cipher = XChaCha20Poly1305::new(&key.into());

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), content)
        .map_err(|_| CryptographyError::EncryptionFailed("aead encryption failed".into()))?;

    let mut payload = Vec::with_capacity(EPHEMERAL_PUB_LEN + NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(ephemeral_pub.as_bytes());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(B64.encode(payload))
}

/// Open a sealed payload with the recipient's key pair.
pub fn open(payload: &str, kp: &EncryptionKeyPair) -> Result<Vec<u8>, CryptographyError> {
    let bytes = B64
        .decode(payload)
        .map_err(|_| CryptographyError::DecryptionFailed("invalid base64url payload".into()))?;
    if bytes.len() < EPHEMERAL_PUB_LEN + NONCE_LEN {
        return Err(CryptographyError::DecryptionFailed("payload too short".into()));
    }

    let (head, ciphertext) = bytes.split_at(EPHEMERAL_PUB_LEN + NONCE_LEN);
    let (eph_bytes, nonce) = head.split_at(EPHEMERAL_PUB_LEN);
    let eph_bytes: [u8; 32] = eph_bytes.try_into().expect("split length checked");
    let ephemeral_pub = X25519Public::from(eph_bytes);

    let recipient_pub = X25519Public::from(kp.secret());
    let shared = kp.secret().diffie_hellman(&ephemeral_pub);

    let key = derive_key(shared.as_bytes(), ephemeral_pub.as_bytes(), recipient_pub.as_bytes());
    let cipher = XChaCha20Poly1305::new(&key.into());

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptographyError::DecryptionFailed("aead authentication failed".into()))
}

// Key derivation binds the symmetric key to both parties' public keys so a
// payload sealed to one recipient cannot be replayed against another.
fn derive_key(shared: &[u8], ephemeral_pub: &[u8], recipient_pub: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared);
    hasher.update(ephemeral_pub);
    hasher.update(recipient_pub);
    hasher.finalize().into()
}
