// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::{RecordHandle, RecordStore};
use crate::crypto::StorageEnvelope;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory record store; clones share the same map
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<String, StorageEnvelope>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, record_id: &str, envelope: &StorageEnvelope) -> Result<RecordHandle> {
        if envelope.record_id != record_id {
            return Err(anyhow!(
                "Record id {} does not match envelope record {}",
                record_id,
                envelope.record_id
            ));
        }
        let mut records = self.records.write().await;
        records.insert(record_id.to_string(), envelope.clone());
        Ok(RecordHandle::new(record_id))
    }

    async fn get(&self, handle: &RecordHandle) -> Result<Option<StorageEnvelope>> {
        let records = self.records.read().await;
        Ok(records.get(handle.as_str()).cloned())
    }

    async fn delete(&self, handle: &RecordHandle) -> Result<bool> {
        let mut records = self.records.write().await;
        Ok(records.remove(handle.as_str()).is_some())
    }

    async fn list(&self) -> Result<Vec<RecordHandle>> {
        let records = self.records.read().await;
        Ok(records.keys().map(RecordHandle::new).collect())
    }
}
