// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encryption Manager
//!
//! Session-scoped façade over the envelope protocol, built from one party's
//! identity. Three usage modes trade signature cost against freshness:
//!
//! - **Session init**: full signed envelope carrying a fresh session key
//! - **Streaming messages**: symmetric AEAD under the session key, no signature
//! - **Storage records**: full signed envelope plus record id and timestamp,
//!   openable later without a live session
//!
//! The manager never logs plaintext, keys or signatures.

use super::envelope::{
    open_with_recovery, seal_with_signature, Envelope, OpenOptions, SealOptions, SESSION_INFO,
    STORAGE_INFO,
};
use super::encryption::{decrypt_with_aead, encrypt_with_aead, random_nonce};
use super::error::CryptoError;
use super::identity::Identity;
use super::message::{DecryptedMessage, Direction, MessageAad, MessageEnvelope};
use super::session_init::{SessionInitPayload, SessionKey};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Tag distinguishing what a signed envelope carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    SessionInit,
    StorageRecord,
}

/// Tagged session-init envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInitEnvelope {
    pub kind: EnvelopeKind,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// Storage envelope: a signed envelope plus unsigned record metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEnvelope {
    pub kind: EnvelopeKind,
    pub record_id: String,
    pub stored_at: DateTime<Utc>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

/// A record opened from storage, attributed to its author
#[derive(Debug, Clone)]
pub struct StoredRecord<T> {
    pub record: T,
    pub record_id: String,
    pub stored_at: DateTime<Utc>,
    pub sender_address: String,
}

/// Per-party encryption façade
#[derive(Debug, Clone)]
pub struct EncryptionManager {
    identity: Identity,
}

impl EncryptionManager {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn address(&self) -> &str {
        self.identity.address()
    }

    pub fn public_key(&self) -> [u8; 33] {
        self.identity.public_key()
    }

    fn seal(
        &self,
        peer_pub: &[u8],
        plaintext: &[u8],
        info: &str,
    ) -> Result<Envelope, CryptoError> {
        seal_with_signature(
            peer_pub,
            self.identity.secret_bytes().as_slice(),
            plaintext,
            SealOptions {
                info: Some(info.to_string()),
                ..Default::default()
            },
        )
    }

    fn open(&self, envelope: &Envelope, info: &str) -> Result<(Zeroizing<Vec<u8>>, String), CryptoError> {
        let opened = open_with_recovery(
            self.identity.secret_bytes().as_slice(),
            &self.identity.public_key(),
            envelope,
            OpenOptions {
                info: Some(info.to_string()),
                ..Default::default()
            },
        )?;
        Ok((opened.plaintext, opened.sender_address))
    }

    /// Seal a session-init payload (which carries the new session key) to the peer
    pub fn encrypt_session_init(
        &self,
        peer_pub: &[u8],
        payload: &SessionInitPayload,
    ) -> Result<SessionInitEnvelope, CryptoError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
        let envelope = self.seal(peer_pub, &plaintext, SESSION_INFO)?;

        debug!(
            "Sealed session init for session {} ({} ciphertext bytes)",
            payload.session_id,
            envelope.ciphertext.len()
        );

        Ok(SessionInitEnvelope {
            kind: EnvelopeKind::SessionInit,
            envelope,
        })
    }

    /// Open a session-init envelope, returning the payload and the verified sender
    pub fn decrypt_session_init(
        &self,
        envelope: &SessionInitEnvelope,
    ) -> Result<(SessionInitPayload, String), CryptoError> {
        if envelope.kind != EnvelopeKind::SessionInit {
            return Err(CryptoError::invalid_payload(
                "kind",
                format!("expected session_init, got {:?}", envelope.kind),
            ));
        }

        let (plaintext, sender_address) = self.open(&envelope.envelope, SESSION_INFO)?;
        let payload: SessionInitPayload = serde_json::from_slice(&plaintext).map_err(|e| {
            CryptoError::invalid_payload("session_init", format!("failed to parse: {}", e))
        })?;

        debug!(
            "Opened session init for session {} from {}",
            payload.session_id, sender_address
        );

        Ok((payload, sender_address))
    }

    /// Encrypt one streamed message under the session key
    pub fn encrypt_message(
        &self,
        session_key: &SessionKey,
        text: &[u8],
        counter: u64,
        direction: Direction,
    ) -> Result<MessageEnvelope, CryptoError> {
        let aad = MessageAad::new(direction, counter).to_bytes();
        let nonce = random_nonce();
        let ciphertext = encrypt_with_aead(text, &nonce, &aad, session_key.as_bytes())?;

        Ok(MessageEnvelope {
            nonce: nonce.to_vec(),
            ciphertext,
            aad: aad.to_vec(),
        })
    }

    /// Decrypt one streamed message with the envelope's own nonce and AAD
    ///
    /// AEAD failures are returned untouched.
    pub fn decrypt_message(
        &self,
        session_key: &SessionKey,
        envelope: &MessageEnvelope,
    ) -> Result<DecryptedMessage, CryptoError> {
        let plaintext = Zeroizing::new(decrypt_with_aead(
            &envelope.ciphertext,
            &envelope.nonce,
            &envelope.aad,
            session_key.as_bytes(),
        )?);
        let aad = MessageAad::from_bytes(&envelope.aad)?;

        Ok(DecryptedMessage { plaintext, aad })
    }

    /// Seal a record for durable storage, readable by `peer_pub` with no live session
    pub fn encrypt_for_storage<T: Serialize>(
        &self,
        peer_pub: &[u8],
        record: &T,
    ) -> Result<StorageEnvelope, CryptoError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(record)?);
        let envelope = self.seal(peer_pub, &plaintext, STORAGE_INFO)?;
        let record_id = Uuid::new_v4().to_string();

        debug!("Sealed storage record {}", record_id);

        Ok(StorageEnvelope {
            kind: EnvelopeKind::StorageRecord,
            record_id,
            stored_at: Utc::now(),
            envelope,
        })
    }

    /// Open a storage envelope addressed to this identity and attribute it
    pub fn decrypt_from_storage<T: DeserializeOwned>(
        &self,
        envelope: &StorageEnvelope,
    ) -> Result<StoredRecord<T>, CryptoError> {
        if envelope.kind != EnvelopeKind::StorageRecord {
            return Err(CryptoError::invalid_payload(
                "kind",
                format!("expected storage_record, got {:?}", envelope.kind),
            ));
        }

        let (plaintext, sender_address) = self.open(&envelope.envelope, STORAGE_INFO)?;
        let record: T = serde_json::from_slice(&plaintext).map_err(|e| {
            CryptoError::invalid_payload("record", format!("failed to parse: {}", e))
        })?;

        Ok(StoredRecord {
            record,
            record_id: envelope.record_id.clone(),
            stored_at: envelope.stored_at,
            sender_address,
        })
    }
}
