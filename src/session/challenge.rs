// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Key-discovery challenge protocol
//!
//! The requester sends 32 random bytes; the responder signs
//! `keccak256("fabstir-e2e-key-challenge-v1" || challenge)` with its
//! long-term key. The requester recomputes the hash, recovers the public key
//! and trusts it only if it hashes to the address it already expected.

use crate::crypto::ecdh::compress_public_key;
use crate::crypto::signature::{address_from_public_key, keccak256};
use crate::crypto::{addresses_match, recover_public_key, CryptoError, Identity};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

pub const CHALLENGE_LEN: usize = 32;
pub const CHALLENGE_DOMAIN_TAG: &[u8] = b"fabstir-e2e-key-challenge-v1";

/// Signature over a challenge digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    #[serde(with = "crate::crypto::hex_bytes")]
    pub signature: Vec<u8>,
    pub recovery_id: u8,
}

pub fn new_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

pub fn challenge_digest(challenge: &[u8]) -> Result<[u8; 32], CryptoError> {
    if challenge.len() != CHALLENGE_LEN {
        return Err(CryptoError::invalid_payload(
            "challenge",
            format!("expected {} bytes, got {}", CHALLENGE_LEN, challenge.len()),
        ));
    }

    let mut preimage = Vec::with_capacity(CHALLENGE_DOMAIN_TAG.len() + CHALLENGE_LEN);
    preimage.extend_from_slice(CHALLENGE_DOMAIN_TAG);
    preimage.extend_from_slice(challenge);
    Ok(keccak256(&preimage))
}

/// Answer a challenge with this identity's long-term key
pub fn respond_to_challenge(
    identity: &Identity,
    challenge: &[u8],
) -> Result<ChallengeResponse, CryptoError> {
    let digest = challenge_digest(challenge)?;
    let (signature, recovery_id) = identity.sign(&digest)?;
    Ok(ChallengeResponse {
        signature: signature.to_vec(),
        recovery_id,
    })
}

/// Recover the responder's compressed public key and check it against `expected_address`
///
/// A key that recovers but belongs to a different address is a
/// `KeyResolutionFailed`; it is never returned.
pub fn verify_challenge_response(
    challenge: &[u8],
    response: &ChallengeResponse,
    expected_address: &str,
) -> Result<[u8; 33], CryptoError> {
    let digest = challenge_digest(challenge)?;
    let public_key = recover_public_key(&digest, &response.signature, response.recovery_id)
        .map_err(|e| {
            CryptoError::key_resolution(expected_address, format!("challenge recovery failed: {}", e))
        })?;

    let recovered_address = address_from_public_key(&public_key);
    if !addresses_match(&recovered_address, expected_address) {
        return Err(CryptoError::key_resolution(
            expected_address,
            format!("challenge was answered by {}", recovered_address),
        ));
    }

    Ok(compress_public_key(&public_key))
}
