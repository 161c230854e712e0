// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Initialization Payload
//!
//! The payload an initiator seals to the responder to open an encrypted
//! session: a freshly generated 32-byte session key plus session metadata
//! (session/job identifiers, selected model, agreed price).

use super::error::CryptoError;
use super::hex_bytes;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// 32-byte symmetric session key, held in memory only and wiped on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Zeroizing<[u8; 32]>);

impl SessionKey {
    /// Generate a new random session key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut key[..]);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::invalid_key(
                "session_key",
                format!("expected 32 bytes, got {}", bytes.len()),
            ));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

impl Serialize for SessionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(format!("0x{}", hex::encode(self.as_bytes())));
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = Zeroizing::new(String::deserialize(deserializer)?);
        let bytes = Zeroizing::new(hex_bytes::decode(&encoded).map_err(serde::de::Error::custom)?);
        SessionKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Decrypted session initialization data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInitPayload {
    /// 32-byte session key for subsequent message encryption
    pub session_key: SessionKey,
    /// Session identifier chosen by the initiator
    pub session_id: String,
    /// Job ID from the marketplace contract
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub job_id: u64,
    /// Model (capability) selected for the session
    pub model_name: String,
    /// Agreed price per token in wei
    #[serde(default)]
    pub price_per_token: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl SessionInitPayload {
    /// Build a payload around a freshly generated session key
    pub fn new(session_id: impl Into<String>, job_id: u64, model_name: impl Into<String>) -> Self {
        Self {
            session_key: SessionKey::generate(),
            session_id: session_id.into(),
            job_id,
            model_name: model_name.into(),
            price_per_token: 0,
            chain_id: None,
        }
    }

    pub fn with_price(mut self, price_per_token: u64) -> Self {
        self.price_per_token = price_per_token;
        self
    }

    pub fn with_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

/// SDK clients send job ids either as JSON numbers or as decimal strings
fn u64_from_str_or_num<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Num(u64),
        Str(String),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
