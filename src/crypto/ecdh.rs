// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! ECDH Key Exchange and Key Derivation
//!
//! Elliptic Curve Diffie-Hellman on secp256k1 (the curve used by Ethereum
//! wallets) followed by HKDF-SHA256. The shared secret is SHA-256 of the ECDH
//! x-coordinate, which is the flow the SDK expects.

use super::error::CryptoError;
use hkdf::Hkdf;
use k256::{
    elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint},
    EncodedPoint, PublicKey, SecretKey,
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Size of a compressed secp256k1 public key
pub const COMPRESSED_PUBLIC_KEY_LEN: usize = 33;
/// Size of an uncompressed secp256k1 public key
pub const UNCOMPRESSED_PUBLIC_KEY_LEN: usize = 65;
/// Size of a secp256k1 private key
pub const PRIVATE_KEY_LEN: usize = 32;

/// Parse a secp256k1 private key, rejecting anything that is not 32 bytes
pub fn parse_secret_key(bytes: &[u8], key_type: &str) -> Result<SecretKey, CryptoError> {
    if bytes.len() != PRIVATE_KEY_LEN {
        return Err(CryptoError::invalid_key(
            key_type,
            format!("expected 32 bytes, got {}", bytes.len()),
        ));
    }
    SecretKey::from_slice(bytes)
        .map_err(|e| CryptoError::invalid_key(key_type, format!("failed to parse: {}", e)))
}

/// Parse a secp256k1 public key in compressed (33) or uncompressed (65) form
pub fn parse_public_key(bytes: &[u8], key_type: &str) -> Result<PublicKey, CryptoError> {
    if bytes.len() != COMPRESSED_PUBLIC_KEY_LEN && bytes.len() != UNCOMPRESSED_PUBLIC_KEY_LEN {
        return Err(CryptoError::invalid_key(
            key_type,
            format!("expected 33 or 65 bytes, got {}", bytes.len()),
        ));
    }

    let encoded_point = EncodedPoint::from_bytes(bytes)
        .map_err(|e| CryptoError::invalid_key(key_type, format!("failed to parse: {}", e)))?;

    Option::from(PublicKey::from_encoded_point(&encoded_point))
        .ok_or_else(|| CryptoError::invalid_key(key_type, "not a valid curve point"))
}

/// Compressed SEC1 encoding of a public key
pub fn compress_public_key(public_key: &PublicKey) -> [u8; 33] {
    let mut out = [0u8; 33];
    out.copy_from_slice(public_key.to_encoded_point(true).as_bytes());
    out
}

/// Derive a 32-byte shared secret via ECDH
///
/// # Arguments
///
/// * `own_priv` - This party's private key (32 bytes)
/// * `other_pub` - The other party's public key (33 bytes compressed or 65 uncompressed)
///
/// # Returns
///
/// `SHA-256(shared_point.x)`, wiped on drop
pub fn derive_shared_secret(
    own_priv: &[u8],
    other_pub: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let own_secret = parse_secret_key(own_priv, "own_private_key")?;
    let other_public = parse_public_key(other_pub, "peer_public_key")?;
    Ok(shared_secret_from_keys(&own_secret, &other_public))
}

pub(crate) fn shared_secret_from_keys(
    own_secret: &SecretKey,
    other_public: &PublicKey,
) -> Zeroizing<[u8; 32]> {
    let ecdh = k256::ecdh::diffie_hellman(own_secret.to_nonzero_scalar(), other_public.as_affine());

    let mut secret = Zeroizing::new([0u8; 32]);
    secret.copy_from_slice(&Sha256::digest(ecdh.raw_secret_bytes()));
    secret
}

/// Derive a 32-byte symmetric key with HKDF-SHA256
///
/// `info` is the protocol's domain-separation string; an empty salt is
/// treated by HKDF as all zeros.
pub fn derive_key(
    secret: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    if secret.len() != 32 {
        return Err(CryptoError::KeyDerivationFailed {
            operation: "hkdf".to_string(),
            reason: format!("expected 32-byte secret, got {}", secret.len()),
        });
    }

    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hkdf = Hkdf::<Sha256>::new(salt, secret);
    let mut derived_key = Zeroizing::new([0u8; 32]);
    hkdf.expand(info, &mut derived_key[..])
        .map_err(|e| CryptoError::KeyDerivationFailed {
            operation: "hkdf".to_string(),
            reason: e.to_string(),
        })?;

    Ok(derived_key)
}
