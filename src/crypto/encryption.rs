//! XChaCha20-Poly1305 Encryption/Decryption
//!
//! Authenticated encryption with a 24-byte nonce and a 16-byte tag appended to
//! the ciphertext. Decryption fails closed: a tag mismatch yields no bytes.

use super::error::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};

pub const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;
pub const TAG_LEN: usize = 16;

fn cipher_for(nonce: &[u8], key: &[u8]) -> Result<XChaCha20Poly1305, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonce {
            expected_size: NONCE_LEN,
            actual_size: nonce.len(),
        });
    }

    if key.len() != KEY_LEN {
        return Err(CryptoError::invalid_key(
            "symmetric_key",
            format!("expected 32 bytes, got {}", key.len()),
        ));
    }

    XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::invalid_key("symmetric_key", e.to_string()))
}

/// Generate a fresh random 24-byte nonce
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Decrypt data using XChaCha20-Poly1305 AEAD
///
/// # Arguments
///
/// * `ciphertext` - Encrypted data (includes authentication tag)
/// * `nonce` - 24-byte nonce
/// * `aad` - Additional authenticated data (can be empty)
/// * `key` - 32-byte encryption key
///
/// # Errors
///
/// `DecryptionFailed` on tag mismatch (tampered data, wrong key or AAD);
/// `InvalidNonce`/`InvalidKey` on malformed sizes.
pub fn decrypt_with_aead(
    ciphertext: &[u8],
    nonce: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(nonce, key)?;

    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::invalid_payload(
            "ciphertext",
            format!("shorter than the {}-byte tag", TAG_LEN),
        ));
    }

    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptionFailed {
            operation: "aead_open".to_string(),
            reason: "authentication tag mismatch".to_string(),
        })
}

/// Encrypt data using XChaCha20-Poly1305 AEAD
///
/// Returns the ciphertext with the 16-byte tag appended.
///
/// **CRITICAL**: Never reuse the same nonce with the same key. Callers in this
/// crate always pass a fresh [`random_nonce`].
pub fn encrypt_with_aead(
    plaintext: &[u8],
    nonce: &[u8],
    aad: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(nonce, key)?;

    cipher
        .encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Other(format!("Encryption failed: {}", e)))
}
