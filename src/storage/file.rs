// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use super::{RecordHandle, RecordStore};
use crate::crypto::StorageEnvelope;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// File-based record store: one JSON file per record under `<base>/records/`
pub struct FileRecordStore {
    base_path: PathBuf,
}

impl FileRecordStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn records_dir(&self) -> PathBuf {
        self.base_path.join("records")
    }

    fn record_path(&self, record_id: &str) -> Result<PathBuf> {
        // Ids become file names, so keep them to a safe alphabet
        let valid = !record_id.is_empty()
            && record_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(anyhow!("Invalid record id: {:?}", record_id));
        }
        Ok(self.records_dir().join(format!("{}.json", record_id)))
    }

    async fn ensure_records_dir(&self) -> Result<()> {
        let dir = self.records_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn put(&self, record_id: &str, envelope: &StorageEnvelope) -> Result<RecordHandle> {
        let path = self.record_path(record_id)?;
        if envelope.record_id != record_id {
            return Err(anyhow!(
                "Record id {} does not match envelope record {}",
                record_id,
                envelope.record_id
            ));
        }
        self.ensure_records_dir().await?;

        let json = serde_json::to_string_pretty(envelope)?;

        // Write atomically using a temp file
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(temp_path, path).await?;

        tracing::debug!("Stored sealed record {}", record_id);
        Ok(RecordHandle::new(record_id))
    }

    async fn get(&self, handle: &RecordHandle) -> Result<Option<StorageEnvelope>> {
        let path = self.record_path(handle.as_str())?;

        if !path.exists() {
            return Ok(None);
        }

        let mut file = fs::File::open(&path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        let envelope: StorageEnvelope = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Corrupt record file {:?}: {}", path, e))?;

        // The file name is not covered by the signature; a swapped file must not pass
        if envelope.record_id != handle.as_str() {
            return Err(anyhow!(
                "Record file {:?} holds record {}, expected {}",
                path,
                envelope.record_id,
                handle
            ));
        }

        Ok(Some(envelope))
    }

    async fn delete(&self, handle: &RecordHandle) -> Result<bool> {
        let path = self.record_path(handle.as_str())?;

        if path.exists() {
            fs::remove_file(&path).await?;
            return Ok(true);
        }

        Ok(false)
    }

    async fn list(&self) -> Result<Vec<RecordHandle>> {
        let dir = self.records_dir();

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut handles = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    handles.push(RecordHandle::new(stem));
                }
            }
        }

        Ok(handles)
    }
}
