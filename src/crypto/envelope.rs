// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Signed Asymmetric Envelopes
//!
//! Composes the codec into a self-authenticating envelope bound to sender,
//! recipient and context:
//!
//! 1. Fresh ephemeral keypair per seal (forward secrecy)
//! 2. ECDH(ephemeral, recipient) + HKDF(salt, info) for the content key
//! 3. XChaCha20-Poly1305 over `senderPublicKey || plaintext`
//! 4. Recoverable ECDSA by the sender over a digest of every header field
//!
//! Opening recovers the signer from the signature, decrypts, and checks the
//! recovered signer against the sealed sender key. Any mismatch is a
//! signature failure; no plaintext is returned.
//!
//! ## Format
//! ```json
//! {
//!   "ephemeralPublicKey": "0x03...",
//!   "salt": "0x...",
//!   "nonce": "0x...",
//!   "ciphertext": "0x...",
//!   "signature": "0x...",
//!   "recoveryId": 1,
//!   "algorithm": "secp256k1-ecdh+hkdf-sha256+xchacha20poly1305",
//!   "info": "fabstir-e2e-session-v1",
//!   "aad": "0x..."
//! }
//! ```

use super::ecdh::{
    compress_public_key, derive_key, parse_public_key, parse_secret_key, shared_secret_from_keys,
    COMPRESSED_PUBLIC_KEY_LEN,
};
use super::encryption::{decrypt_with_aead, encrypt_with_aead, random_nonce, NONCE_LEN, TAG_LEN};
use super::error::CryptoError;
use super::hex_bytes;
use super::signature::{address_from_public_key, recover_public_key, sign_digest, SIGNATURE_LEN};
use k256::SecretKey;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Curve + KDF + cipher suite identifier carried in every envelope
pub const ALGORITHM_ID: &str = "secp256k1-ecdh+hkdf-sha256+xchacha20poly1305";

/// HKDF info for session-init envelopes
pub const SESSION_INFO: &str = "fabstir-e2e-session-v1";

/// HKDF info for durable storage envelopes
pub const STORAGE_INFO: &str = "fabstir-e2e-storage-v1";

/// Domain tag prefixed to the signed digest
pub const DIGEST_DOMAIN_TAG: &[u8] = b"fabstir-e2e-envelope-sig-v1";

pub const SALT_LEN: usize = 16;

/// Asymmetric, fully signed envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Compressed ephemeral public key (33 bytes)
    #[serde(with = "hex_bytes")]
    pub ephemeral_public_key: Vec<u8>,
    /// HKDF salt (16 bytes)
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
    /// XChaCha20 nonce (24 bytes)
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
    /// Ciphertext with 16-byte Poly1305 tag appended
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    /// Compact `r || s` signature (64 bytes)
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Recovery id (0-3)
    pub recovery_id: u8,
    #[serde(rename = "algorithm")]
    pub algorithm_id: String,
    #[serde(rename = "info")]
    pub context_info: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "hex_bytes::option"
    )]
    pub aad: Option<Vec<u8>>,
}

/// Optional overrides for [`seal_with_signature`]
#[derive(Debug, Clone, Default)]
pub struct SealOptions {
    pub salt: Option<[u8; SALT_LEN]>,
    pub nonce: Option<[u8; NONCE_LEN]>,
    pub aad: Option<Vec<u8>>,
    pub info: Option<String>,
}

/// Optional overrides for [`open_with_recovery`]
///
/// `info`, when given, must equal the envelope's context info. `aad`, when
/// given, replaces the AAD carried in the envelope.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub aad: Option<Vec<u8>>,
    pub info: Option<String>,
}

/// Result of opening an envelope
#[derive(Clone)]
pub struct OpenedEnvelope {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub sender_address: String,
    pub sender_public_key: [u8; 33],
}

impl fmt::Debug for OpenedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedEnvelope")
            .field("plaintext_len", &self.plaintext.len())
            .field("sender_address", &self.sender_address)
            .finish()
    }
}

impl Envelope {
    /// Validate every fixed-size field and the suite identifier
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.ephemeral_public_key.len() != COMPRESSED_PUBLIC_KEY_LEN {
            return Err(CryptoError::invalid_key(
                "ephemeral_public_key",
                format!(
                    "expected 33 bytes, got {}",
                    self.ephemeral_public_key.len()
                ),
            ));
        }
        if self.salt.len() != SALT_LEN {
            return Err(CryptoError::invalid_payload(
                "salt",
                format!("expected 16 bytes, got {}", self.salt.len()),
            ));
        }
        if self.nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonce {
                expected_size: NONCE_LEN,
                actual_size: self.nonce.len(),
            });
        }
        if self.ciphertext.len() < TAG_LEN + COMPRESSED_PUBLIC_KEY_LEN {
            return Err(CryptoError::invalid_payload(
                "ciphertext",
                format!("too short: {} bytes", self.ciphertext.len()),
            ));
        }
        if self.signature.len() != SIGNATURE_LEN {
            return Err(CryptoError::invalid_payload(
                "signature",
                format!("expected 64 bytes, got {}", self.signature.len()),
            ));
        }
        if self.recovery_id > 3 {
            return Err(CryptoError::invalid_payload(
                "recoveryId",
                format!("expected 0-3, got {}", self.recovery_id),
            ));
        }
        if self.algorithm_id != ALGORITHM_ID {
            return Err(CryptoError::invalid_payload(
                "algorithm",
                format!("unsupported algorithm: {}", self.algorithm_id),
            ));
        }
        if self.context_info.is_empty() {
            return Err(CryptoError::invalid_payload("info", "cannot be empty"));
        }
        Ok(())
    }

    fn digest(&self, recipient_pub: &[u8; 33], aad: Option<&[u8]>) -> [u8; 32] {
        envelope_digest(
            &self.ephemeral_public_key,
            recipient_pub,
            &self.salt,
            &self.nonce,
            self.context_info.as_bytes(),
            aad,
        )
    }
}

/// Digest signed by the sender
///
/// `SHA-256(tag || ephPub || recipientPub || salt || nonce || len(info) || info || aad?)`
/// with 4-byte big-endian lengths and a presence byte for the AAD.
pub fn envelope_digest(
    ephemeral_pub: &[u8],
    recipient_pub: &[u8; 33],
    salt: &[u8],
    nonce: &[u8],
    info: &[u8],
    aad: Option<&[u8]>,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DIGEST_DOMAIN_TAG);
    hasher.update(ephemeral_pub);
    hasher.update(recipient_pub);
    hasher.update(salt);
    hasher.update(nonce);
    hasher.update((info.len() as u32).to_be_bytes());
    hasher.update(info);
    match aad {
        Some(aad) => {
            hasher.update([1u8]);
            hasher.update((aad.len() as u32).to_be_bytes());
            hasher.update(aad);
        }
        None => hasher.update([0u8]),
    }
    hasher.finalize().into()
}

/// Seal `plaintext` to `recipient_pub`, signed by `sender_priv`
pub fn seal_with_signature(
    recipient_pub: &[u8],
    sender_priv: &[u8],
    plaintext: &[u8],
    options: SealOptions,
) -> Result<Envelope, CryptoError> {
    let recipient = parse_public_key(recipient_pub, "recipient_public_key")?;
    let recipient_compressed = compress_public_key(&recipient);
    let sender = parse_secret_key(sender_priv, "sender_private_key")?;
    let sender_public = compress_public_key(&sender.public_key());

    let salt = options.salt.unwrap_or_else(|| {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    });
    let nonce = options.nonce.unwrap_or_else(random_nonce);
    let info = options.info.unwrap_or_else(|| SESSION_INFO.to_string());
    let aad = options.aad;

    let mut framed = Zeroizing::new(Vec::with_capacity(COMPRESSED_PUBLIC_KEY_LEN + plaintext.len()));
    framed.extend_from_slice(&sender_public);
    framed.extend_from_slice(plaintext);

    // The ephemeral secret lives only inside this block and is wiped on drop.
    let (ephemeral_public_key, ciphertext) = {
        let ephemeral = SecretKey::random(&mut OsRng);
        let shared_secret = shared_secret_from_keys(&ephemeral, &recipient);
        let key = derive_key(&shared_secret[..], &salt, info.as_bytes())?;
        let ciphertext = encrypt_with_aead(
            &framed,
            &nonce,
            aad.as_deref().unwrap_or_default(),
            &key[..],
        )?;
        (compress_public_key(&ephemeral.public_key()), ciphertext)
    };

    let digest = envelope_digest(
        &ephemeral_public_key,
        &recipient_compressed,
        &salt,
        &nonce,
        info.as_bytes(),
        aad.as_deref(),
    );
    let (signature, recovery_id) = sign_digest(&digest, sender_priv)?;

    Ok(Envelope {
        ephemeral_public_key: ephemeral_public_key.to_vec(),
        salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        ciphertext,
        signature: signature.to_vec(),
        recovery_id,
        algorithm_id: ALGORITHM_ID.to_string(),
        context_info: info,
        aad,
    })
}

/// Verify and decrypt an envelope addressed to `own_pub`
///
/// The signature is checked before any decryption is attempted.
pub fn open_with_recovery(
    own_priv: &[u8],
    own_pub: &[u8],
    envelope: &Envelope,
    options: OpenOptions,
) -> Result<OpenedEnvelope, CryptoError> {
    envelope.validate()?;

    if let Some(expected_info) = &options.info {
        if expected_info != &envelope.context_info {
            return Err(CryptoError::invalid_payload(
                "info",
                format!(
                    "context mismatch: expected {}, got {}",
                    expected_info, envelope.context_info
                ),
            ));
        }
    }

    let own_secret = parse_secret_key(own_priv, "own_private_key")?;
    let own_compressed = compress_public_key(&parse_public_key(own_pub, "own_public_key")?);
    if compress_public_key(&own_secret.public_key()) != own_compressed {
        return Err(CryptoError::invalid_key(
            "own_public_key",
            "does not belong to the supplied private key",
        ));
    }

    let aad = options.aad.as_deref().or(envelope.aad.as_deref());

    // 1-2. Recover and verify the signer
    let digest = envelope.digest(&own_compressed, aad);
    let sender = recover_public_key(&digest, &envelope.signature, envelope.recovery_id)?;
    let sender_public = compress_public_key(&sender);

    // 3-5. Derive the content key and decrypt
    let ephemeral = parse_public_key(&envelope.ephemeral_public_key, "ephemeral_public_key")?;
    let shared_secret = shared_secret_from_keys(&own_secret, &ephemeral);
    let key = derive_key(&shared_secret[..], &envelope.salt, envelope.context_info.as_bytes())?;
    let framed = Zeroizing::new(
        decrypt_with_aead(
            &envelope.ciphertext,
            &envelope.nonce,
            aad.unwrap_or_default(),
            &key[..],
        )
        .map_err(|e| match e {
            CryptoError::DecryptionFailed { reason, .. } => CryptoError::DecryptionFailed {
                operation: "open_with_recovery".to_string(),
                reason,
            },
            other => other,
        })?,
    );

    if framed.len() < COMPRESSED_PUBLIC_KEY_LEN
        || framed[..COMPRESSED_PUBLIC_KEY_LEN] != sender_public[..]
    {
        return Err(CryptoError::invalid_signature(
            "open_with_recovery",
            "recovered signer does not match sealed sender",
        ));
    }

    // 6. Attribute
    Ok(OpenedEnvelope {
        plaintext: Zeroizing::new(framed[COMPRESSED_PUBLIC_KEY_LEN..].to_vec()),
        sender_address: address_from_public_key(&sender),
        sender_public_key: sender_public,
    })
}

/// Attribute an envelope to its signer without decrypting it
///
/// Only the signature is checked; the sealed-sender cross-check needs the
/// recipient's private key. A corrupted recovery id still recovers a valid
/// key, so this returns some other address rather than an error. Treat the
/// result as a claim and compare it against an expected address; only
/// `open_with_recovery` rejects a corrupted recovery id outright.
pub fn recover_sender_address(
    envelope: &Envelope,
    recipient_pub: &[u8],
) -> Result<String, CryptoError> {
    envelope.validate()?;
    let recipient = compress_public_key(&parse_public_key(recipient_pub, "recipient_public_key")?);
    let digest = envelope.digest(&recipient, envelope.aad.as_deref());
    let sender = recover_public_key(&digest, &envelope.signature, envelope.recovery_id)?;
    Ok(address_from_public_key(&sender))
}
