// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Sealed record persistence
//!
//! Records are sealed to a recipient's static key with a fresh ephemeral
//! key per record, so the recipient can open them later with no live
//! session, and each record is attributed to its author.

use super::{RecordHandle, RecordStore};
use crate::crypto::{CryptoError, EncryptionManager, StoredRecord};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct EncryptedRecords {
    manager: EncryptionManager,
    store: Arc<dyn RecordStore>,
}

impl EncryptedRecords {
    pub fn new(manager: EncryptionManager, store: Arc<dyn RecordStore>) -> Self {
        Self { manager, store }
    }

    /// Seal `record` to `recipient_pub` and persist it
    pub async fn save<T: Serialize>(
        &self,
        recipient_pub: &[u8],
        record: &T,
    ) -> Result<RecordHandle, CryptoError> {
        let envelope = self.manager.encrypt_for_storage(recipient_pub, record)?;
        let handle = self
            .store
            .put(&envelope.record_id, &envelope)
            .await
            .map_err(|e| CryptoError::transport("record_put", e))?;

        info!("💾 Sealed record {} stored", handle);
        Ok(handle)
    }

    /// Load and open a record addressed to this identity
    ///
    /// `Ok(None)` when the store has no such record. Any verification or
    /// decryption failure is returned as-is; no partial record escapes.
    pub async fn load<T: DeserializeOwned>(
        &self,
        handle: &RecordHandle,
    ) -> Result<Option<StoredRecord<T>>, CryptoError> {
        let envelope = match self
            .store
            .get(handle)
            .await
            .map_err(|e| CryptoError::transport("record_get", e))?
        {
            Some(envelope) => envelope,
            None => return Ok(None),
        };

        let record = self.manager.decrypt_from_storage(&envelope)?;
        debug!(
            "Opened record {} authored by {}",
            record.record_id, record.sender_address
        );
        Ok(Some(record))
    }

    pub async fn delete(&self, handle: &RecordHandle) -> Result<bool, CryptoError> {
        self.store
            .delete(handle)
            .await
            .map_err(|e| CryptoError::transport("record_delete", e))
    }

    pub async fn list(&self) -> Result<Vec<RecordHandle>, CryptoError> {
        self.store
            .list()
            .await
            .map_err(|e| CryptoError::transport("record_list", e))
    }
}
