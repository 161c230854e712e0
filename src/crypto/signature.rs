// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recoverable ECDSA Signatures and Address Derivation
//!
//! Signatures are 64-byte compact `r || s` plus a separate recovery id (0-3),
//! so a verifier reconstructs the signer's public key from the digest alone.
//! Addresses follow the Ethereum convention: the last 20 bytes of
//! Keccak-256 over the uncompressed public key, rendered with the EIP-55
//! mixed-case checksum.

use super::ecdh::{parse_public_key, parse_secret_key};
use super::error::CryptoError;
use k256::ecdsa::{
    signature::hazmat::PrehashVerifier, RecoveryId, Signature, SigningKey, VerifyingKey,
};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use tiny_keccak::{Hasher, Keccak};

pub const SIGNATURE_LEN: usize = 64;
pub const DIGEST_LEN: usize = 32;

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

fn check_digest(digest: &[u8], operation: &str) -> Result<(), CryptoError> {
    if digest.len() != DIGEST_LEN {
        return Err(CryptoError::invalid_payload(
            "digest",
            format!(
                "{}: expected 32 bytes, got {}",
                operation,
                digest.len()
            ),
        ));
    }
    Ok(())
}

/// Sign a 32-byte digest, returning the compact signature and its recovery id
pub fn sign_digest(digest: &[u8], private_key: &[u8]) -> Result<([u8; 64], u8), CryptoError> {
    check_digest(digest, "sign")?;
    let secret = parse_secret_key(private_key, "signing_key")?;
    let signing_key = SigningKey::from(&secret);

    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(digest)
        .map_err(|e| CryptoError::invalid_signature("sign", e.to_string()))?;

    let mut compact = [0u8; SIGNATURE_LEN];
    compact.copy_from_slice(&signature.to_bytes());
    Ok((compact, recovery_id.to_byte()))
}

/// Recover the signer's public key from a digest, signature and recovery id
///
/// The recovered key is verified against the signature before it is
/// returned; nothing partially-verified escapes.
pub fn recover_public_key(
    digest: &[u8],
    signature: &[u8],
    recovery_id: u8,
) -> Result<PublicKey, CryptoError> {
    check_digest(digest, "recover")?;

    if signature.len() != SIGNATURE_LEN {
        return Err(CryptoError::invalid_signature(
            "recover",
            format!("expected 64 bytes, got {}", signature.len()),
        ));
    }

    let recovery_id = RecoveryId::from_byte(recovery_id).ok_or_else(|| {
        CryptoError::invalid_signature(
            "recover",
            format!("invalid recovery ID: expected 0-3, got {}", recovery_id),
        )
    })?;

    let signature = Signature::from_slice(signature)
        .map_err(|e| CryptoError::invalid_signature("recover", format!("malformed: {}", e)))?;

    let verifying_key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id)
        .map_err(|e| CryptoError::invalid_signature("recover", e.to_string()))?;

    verifying_key
        .verify_prehash(digest, &signature)
        .map_err(|e| CryptoError::invalid_signature("verify", e.to_string()))?;

    Ok(PublicKey::from(&verifying_key))
}

/// Verify a signature against a known public key
pub fn verify_digest(digest: &[u8], signature: &[u8], public_key: &[u8]) -> Result<(), CryptoError> {
    check_digest(digest, "verify")?;
    let public_key = parse_public_key(public_key, "signer_public_key")?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| CryptoError::invalid_signature("verify", format!("malformed: {}", e)))?;

    VerifyingKey::from(&public_key)
        .verify_prehash(digest, &signature)
        .map_err(|e| CryptoError::invalid_signature("verify", e.to_string()))
}

/// Derive the EIP-55 checksummed address of a public key
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    // Uncompressed encoding is 0x04 || x || y; the prefix byte is not hashed
    let encoded = public_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);

    let mut raw = [0u8; 20];
    raw.copy_from_slice(&hash[12..]);
    to_checksum_address(&raw)
}

/// Derive the checksummed address from compressed or uncompressed key bytes
pub fn address_of(public_key: &[u8]) -> Result<String, CryptoError> {
    let public_key = parse_public_key(public_key, "public_key")?;
    Ok(address_from_public_key(&public_key))
}

/// Render a 20-byte address with the EIP-55 mixed-case checksum
pub fn to_checksum_address(raw: &[u8; 20]) -> String {
    let lower = hex::encode(raw);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Compare two addresses ignoring checksum case
pub fn addresses_match(a: &str, b: &str) -> bool {
    let a = a.strip_prefix("0x").unwrap_or(a);
    let b = b.strip_prefix("0x").unwrap_or(b);
    a.len() == 40 && a.eq_ignore_ascii_case(b)
}
