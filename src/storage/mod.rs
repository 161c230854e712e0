// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Durable storage for sealed records
//!
//! Stores persist `StorageEnvelope`s verbatim; they never see plaintext.
//! `EncryptedRecords` pairs a store with an `EncryptionManager` to seal on
//! write and open (with sender attribution) on read.

pub mod file;
pub mod memory;
pub mod records;

use crate::crypto::StorageEnvelope;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use records::EncryptedRecords;

/// Opaque retrieval handle returned by `RecordStore::put`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordHandle(String);

impl RecordHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for sealed-record storage backends
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist an envelope under `record_id`, replacing any previous one
    ///
    /// `record_id` must equal `envelope.record_id`.
    async fn put(&self, record_id: &str, envelope: &StorageEnvelope) -> Result<RecordHandle>;

    async fn get(&self, handle: &RecordHandle) -> Result<Option<StorageEnvelope>>;

    /// Returns whether a record was removed
    async fn delete(&self, handle: &RecordHandle) -> Result<bool>;

    async fn list(&self) -> Result<Vec<RecordHandle>>;
}
