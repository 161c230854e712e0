//! Sealed records: written by one party, opened later by the recipient

use fabstir_e2e_session::crypto::{
    CryptoError, EncryptionManager, EnvelopeKind, ErrorKind, Identity,
};
use fabstir_e2e_session::storage::{
    EncryptedRecords, FileRecordStore, MemoryRecordStore, RecordHandle, RecordStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Checkpoint {
    session_id: String,
    token_count: u64,
    summary: String,
}

fn checkpoint() -> Checkpoint {
    Checkpoint {
        session_id: "sess-42".to_string(),
        token_count: 1_000,
        summary: "user asked about rust lifetimes".to_string(),
    }
}

#[tokio::test]
async fn test_host_opens_record_after_author_is_gone() {
    let temp_dir = TempDir::new().unwrap();
    let author = Identity::random();
    let author_address = author.address().to_string();
    let host = Identity::random();

    let handle = {
        let records = EncryptedRecords::new(
            EncryptionManager::new(author),
            Arc::new(FileRecordStore::new(temp_dir.path())),
        );
        records.save(&host.public_key(), &checkpoint()).await.unwrap()
    };

    // New process: only the host key and the directory remain
    let records = EncryptedRecords::new(
        EncryptionManager::new(host),
        Arc::new(FileRecordStore::new(temp_dir.path())),
    );
    let stored = records.load::<Checkpoint>(&handle).await.unwrap().unwrap();

    assert_eq!(stored.record, checkpoint());
    assert_eq!(stored.record_id, handle.as_str());
    assert_eq!(stored.sender_address, author_address);
}

#[tokio::test]
async fn test_record_for_someone_else_cannot_be_opened() {
    let store = Arc::new(MemoryRecordStore::new());
    let host = Identity::random();

    let author = EncryptedRecords::new(EncryptionManager::new(Identity::random()), store.clone());
    let handle = author.save(&host.public_key(), &checkpoint()).await.unwrap();

    let eavesdropper = EncryptedRecords::new(EncryptionManager::new(Identity::random()), store);
    let result = eavesdropper.load::<Checkpoint>(&handle).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_tampered_record_is_rejected() {
    let store = Arc::new(MemoryRecordStore::new());
    let host = Identity::random();

    let author = EncryptedRecords::new(EncryptionManager::new(Identity::random()), store.clone());
    let handle = author.save(&host.public_key(), &checkpoint()).await.unwrap();

    let mut envelope = store.get(&handle).await.unwrap().unwrap();
    envelope.envelope.ciphertext[0] ^= 0x01;
    store.put(handle.as_str(), &envelope).await.unwrap();

    let reader = EncryptedRecords::new(EncryptionManager::new(host), store);
    let err = reader.load::<Checkpoint>(&handle).await.unwrap_err();
    assert!(err.is_fatal_to_session());
    assert_ne!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_session_envelope_is_not_a_record() {
    let store = Arc::new(MemoryRecordStore::new());
    let host = Identity::random();

    let author = EncryptedRecords::new(EncryptionManager::new(Identity::random()), store.clone());
    let handle = author.save(&host.public_key(), &checkpoint()).await.unwrap();

    let mut envelope = store.get(&handle).await.unwrap().unwrap();
    envelope.kind = EnvelopeKind::SessionInit;
    store.put(handle.as_str(), &envelope).await.unwrap();

    let reader = EncryptedRecords::new(EncryptionManager::new(host), store);
    let err = reader.load::<Checkpoint>(&handle).await.unwrap_err();
    assert!(matches!(err, CryptoError::InvalidPayload { .. }));
}

#[tokio::test]
async fn test_record_with_wrong_shape_is_rejected() {
    let store = Arc::new(MemoryRecordStore::new());
    let host = Identity::random();

    let author = EncryptedRecords::new(EncryptionManager::new(Identity::random()), store.clone());
    let handle = author
        .save(&host.public_key(), &serde_json::json!({ "unexpected": true }))
        .await
        .unwrap();

    let reader = EncryptedRecords::new(EncryptionManager::new(host), store);
    let err = reader.load::<Checkpoint>(&handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_list_and_delete() {
    let store = Arc::new(MemoryRecordStore::new());
    let host = Identity::random();
    let records = EncryptedRecords::new(EncryptionManager::new(Identity::random()), store.clone());

    let first = records.save(&host.public_key(), &checkpoint()).await.unwrap();
    let second = records.save(&host.public_key(), &checkpoint()).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(records.list().await.unwrap().len(), 2);

    assert!(records.delete(&first).await.unwrap());
    assert!(!records.delete(&first).await.unwrap());
    assert_eq!(records.list().await.unwrap(), vec![second]);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_missing_record_loads_as_none() {
    let records = EncryptedRecords::new(
        EncryptionManager::new(Identity::random()),
        Arc::new(MemoryRecordStore::new()),
    );
    let loaded = records
        .load::<Checkpoint>(&RecordHandle::new("nope"))
        .await
        .unwrap();
    assert!(loaded.is_none());
}
