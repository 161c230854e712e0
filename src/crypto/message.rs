// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Symmetric Streaming Messages
//!
//! Mid-stream messages are encrypted with the session key only; no signature.
//! The AAD binds direction, message index and timestamp in a fixed 17-byte
//! layout: `direction (1) || message_index (u64 BE) || timestamp_ms (u64 BE)`.

use super::error::CryptoError;
use super::hex_bytes;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const MESSAGE_AAD_LEN: usize = 17;

/// Which side of the session produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    InitiatorToResponder,
    ResponderToInitiator,
}

impl Direction {
    fn to_byte(self) -> u8 {
        match self {
            Direction::InitiatorToResponder => 0x01,
            Direction::ResponderToInitiator => 0x02,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Direction::InitiatorToResponder),
            0x02 => Some(Direction::ResponderToInitiator),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::InitiatorToResponder => Direction::ResponderToInitiator,
            Direction::ResponderToInitiator => Direction::InitiatorToResponder,
        }
    }
}

/// Authenticated context for one streamed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageAad {
    pub direction: Direction,
    pub message_index: u64,
    pub timestamp_ms: u64,
}

impl MessageAad {
    pub fn new(direction: Direction, message_index: u64) -> Self {
        Self {
            direction,
            message_index,
            timestamp_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }

    pub fn to_bytes(&self) -> [u8; MESSAGE_AAD_LEN] {
        let mut out = [0u8; MESSAGE_AAD_LEN];
        out[0] = self.direction.to_byte();
        out[1..9].copy_from_slice(&self.message_index.to_be_bytes());
        out[9..17].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != MESSAGE_AAD_LEN {
            return Err(CryptoError::invalid_payload(
                "aad",
                format!("expected {} bytes, got {}", MESSAGE_AAD_LEN, bytes.len()),
            ));
        }

        let direction = Direction::from_byte(bytes[0]).ok_or_else(|| {
            CryptoError::invalid_payload("aad", format!("unknown direction byte {}", bytes[0]))
        })?;

        let mut index = [0u8; 8];
        index.copy_from_slice(&bytes[1..9]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[9..17]);

        Ok(Self {
            direction,
            message_index: u64::from_be_bytes(index),
            timestamp_ms: u64::from_be_bytes(timestamp),
        })
    }
}

/// Encrypted streaming message as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "nonceHex", with = "hex_bytes")]
    pub nonce: Vec<u8>,
    #[serde(rename = "ciphertextHex", with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(rename = "aadHex", with = "hex_bytes")]
    pub aad: Vec<u8>,
}

/// A decrypted streaming message and the context it was bound to
pub struct DecryptedMessage {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub aad: MessageAad,
}

impl std::fmt::Debug for DecryptedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedMessage")
            .field("plaintext_len", &self.plaintext.len())
            .field("aad", &self.aad)
            .finish()
    }
}
