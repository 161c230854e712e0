// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-End Encryption Module
//!
//! Cryptographic envelope scheme for marketplace sessions:
//!
//! - **ECDH**: secp256k1 key agreement with single-use ephemeral keys
//! - **HKDF**: HKDF-SHA256 with a fixed domain-separation info string
//! - **Encryption**: XChaCha20-Poly1305 AEAD (24-byte nonce, 16-byte tag)
//! - **Signature**: recoverable ECDSA, so the sender is identified from the
//!   signature itself
//! - **Envelope**: seal-with-signature / open-with-recovery
//! - **Manager**: session init, streaming messages and storage records
//!
//! ## Security Considerations
//!
//! - Session keys are held in memory only, never persisted
//! - Ephemeral private keys are wiped as soon as the seal completes
//! - Nonces are freshly randomized for every encryption
//! - No plaintext is released until the recovered signer matches the sealed sender
//!
//! ## Protocol Flow
//!
//! 1. Initiator resolves the responder's static public key
//! 2. Initiator generates a session key and seals it in a signed envelope
//! 3. Responder opens the envelope and recovers the initiator's address
//! 4. Both sides stream messages under the session key with counter-bound AAD
//! 5. Session close drops the key

pub mod ecdh;
pub mod encryption;
pub mod envelope;
pub mod error;
pub(crate) mod hex_bytes;
pub mod identity;
pub mod manager;
pub mod message;
pub mod session_init;
pub mod signature;

pub use ecdh::{derive_key, derive_shared_secret};
pub use encryption::{decrypt_with_aead, encrypt_with_aead};
pub use envelope::{
    open_with_recovery, recover_sender_address, seal_with_signature, Envelope, OpenOptions,
    OpenedEnvelope, SealOptions,
};
pub use error::{CryptoError, ErrorKind, UserOutcome};
pub use identity::Identity;
pub use manager::{
    EncryptionManager, EnvelopeKind, SessionInitEnvelope, StorageEnvelope, StoredRecord,
};
pub use message::{DecryptedMessage, Direction, MessageAad, MessageEnvelope};
pub use session_init::{SessionInitPayload, SessionKey};
pub use signature::{address_of, addresses_match, recover_public_key, sign_digest};
