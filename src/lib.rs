// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod config;
pub mod crypto;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod version;

// Re-export main types
pub use config::E2eConfig;
pub use crypto::{
    CryptoError, EncryptionManager, Envelope, ErrorKind, Identity, SessionInitPayload, SessionKey,
    UserOutcome,
};
pub use session::{
    InboundEvent, MemoryChannel, PeerKeyCache, PeerKeyResolver, SessionChannel, SessionRegistry,
    SessionState, StartSession, WireMessage,
};
pub use storage::{EncryptedRecords, FileRecordStore, MemoryRecordStore, RecordHandle, RecordStore};
