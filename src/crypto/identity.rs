// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Long-term Party Identity
//!
//! A party's secp256k1 key pair plus its derived checksummed address. The
//! identity is immutable once constructed and is handed explicitly to every
//! manager and session registry that needs it.
//!
//! ## Security Considerations
//!
//! - The private key is wiped when the identity is dropped
//! - `Debug` output never includes the private key
//! - Loading from the environment only logs success, never the key

use super::ecdh::{compress_public_key, parse_secret_key};
use super::error::CryptoError;
use super::signature::{address_from_public_key, sign_digest};
use crate::config::E2eConfig;
use k256::SecretKey;
use rand::rngs::OsRng;
use std::env;
use std::fmt;
use tracing::info;
use zeroize::Zeroizing;

/// A party's long-term key pair and address
#[derive(Clone)]
pub struct Identity {
    secret: SecretKey,
    public_key: [u8; 33],
    address: String,
}

impl Identity {
    /// Build an identity from a raw 32-byte private key
    pub fn from_bytes(private_key: &[u8]) -> Result<Self, CryptoError> {
        let secret = parse_secret_key(private_key, "identity_private_key")?;
        Ok(Self::from_secret(secret))
    }

    /// Build an identity from a hex private key, with or without `0x`
    pub fn from_hex(private_key_hex: &str) -> Result<Self, CryptoError> {
        let trimmed = private_key_hex.trim();
        let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        if hex_str.len() != 64 {
            return Err(CryptoError::invalid_key(
                "identity_private_key",
                format!(
                    "must be exactly 64 hex characters (32 bytes), got {} characters",
                    hex_str.len()
                ),
            ));
        }

        let key_bytes = Zeroizing::new(hex::decode(hex_str).map_err(|e| {
            CryptoError::invalid_key(
                "identity_private_key",
                format!("contains invalid hex characters: {}", e),
            )
        })?);

        Self::from_bytes(&key_bytes)
    }

    /// Load the identity from an environment variable
    ///
    /// The variable must hold a `0x`-prefixed, 64-hex-character key (wallet format).
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        let key_str = Zeroizing::new(env::var(var).map_err(|_| {
            CryptoError::invalid_key(
                "identity_private_key",
                format!("{} environment variable not set", var),
            )
        })?);

        let key_str = key_str.trim();
        if key_str.is_empty() {
            return Err(CryptoError::invalid_key(
                "identity_private_key",
                format!("{} is empty", var),
            ));
        }
        if !key_str.starts_with("0x") {
            return Err(CryptoError::invalid_key(
                "identity_private_key",
                format!("{} must start with '0x' prefix (Ethereum format)", var),
            ));
        }

        let identity = Self::from_hex(key_str)?;
        info!(
            "✅ Identity loaded from {} (address: {})",
            var, identity.address
        );
        Ok(identity)
    }

    /// Load the identity from the variable named by `config.private_key_env`
    pub fn from_config(config: &E2eConfig) -> Result<Self, CryptoError> {
        Self::from_env(&config.private_key_env)
    }

    /// Generate a fresh random identity
    pub fn random() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self {
            public_key: compress_public_key(&public),
            address: address_from_public_key(&public),
            secret,
        }
    }

    /// Compressed 33-byte public key
    pub fn public_key(&self) -> [u8; 33] {
        self.public_key
    }

    /// EIP-55 checksummed address
    pub fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&self.secret.to_bytes());
        out
    }

    /// Sign a 32-byte digest with the long-term key
    pub fn sign(&self, digest: &[u8]) -> Result<([u8; 64], u8), CryptoError> {
        sign_digest(digest, self.secret_bytes().as_slice())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .field("public_key", &format!("0x{}", hex::encode(self.public_key)))
            .finish_non_exhaustive()
    }
}
