// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Typed failures for every envelope, session and key-discovery operation.
//!
//! ## Error Variants
//!
//! - **InvalidKey / InvalidNonce / InvalidPayload / KeyDerivationFailed**: malformed
//!   field lengths or encodings (validation errors)
//! - **InvalidSignature**: signature recovery or verification failed
//! - **DecryptionFailed**: AEAD tag mismatch (tampered ciphertext, wrong key or AAD)
//! - **KeyResolutionFailed**: no public key obtainable for a peer, or the key
//!   failed address verification
//! - **SessionState / SessionKeyNotFound**: message for a session with no active
//!   key, or malformed counter/AAD
//! - **Transport**: the session channel or store collaborator failed
//!
//! ## Context Preservation
//!
//! Variants carry the operation, field or key type that failed plus a reason.
//! None of them ever carry key material or plaintext.

use thiserror::Error;

/// Comprehensive error type for all cryptographic and session operations
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// AEAD decryption failed
    ///
    /// Authentication tag mismatch: ciphertext tampered, wrong key, or AAD differs.
    #[error("Decryption failed during {operation}: {reason}")]
    DecryptionFailed { operation: String, reason: String },

    /// ECDSA signature recovery or verification failed
    #[error("Invalid signature during {operation}: {reason}")]
    InvalidSignature { operation: String, reason: String },

    /// Invalid cryptographic key (wrong size, invalid point, malformed)
    #[error("Invalid key ({key_type}): {reason}")]
    InvalidKey { key_type: String, reason: String },

    /// XChaCha20-Poly1305 requires exactly 24-byte nonces
    #[error("Invalid nonce size: expected {expected_size} bytes, got {actual_size} bytes")]
    InvalidNonce {
        expected_size: usize,
        actual_size: usize,
    },

    /// ECDH or HKDF key derivation failed
    #[error("Key derivation failed during {operation}: {reason}")]
    KeyDerivationFailed { operation: String, reason: String },

    /// Envelope or payload field validation failed
    #[error("Invalid payload field '{field}': {reason}")]
    InvalidPayload { field: String, reason: String },

    /// No verified public key could be obtained for a peer
    #[error("Key resolution failed for {address}: {reason}")]
    KeyResolutionFailed { address: String, reason: String },

    /// Operation is not valid in the session's current state
    #[error("Session {session_id} state error: {reason}")]
    SessionState { session_id: String, reason: String },

    /// Session key not found (never established, closed, or failed)
    #[error("Session key not found for session_id: {session_id}")]
    SessionKeyNotFound { session_id: String },

    /// Channel or store collaborator failure
    #[error("Transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    /// Generic error for library errors or unexpected failures
    #[error("Crypto error: {0}")]
    Other(String),
}

/// Failure taxonomy used by callers to decide on remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Signature,
    Authentication,
    KeyResolution,
    SessionState,
    Transport,
    Internal,
}

/// User-visible outcome of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// "sender could not be verified" - distrust the peer
    SenderUnverified,
    /// "message was tampered with" - re-establish the session
    Tampered,
    /// "no key available for peer" - re-fetch or re-challenge for a key
    NoKeyForPeer,
    Other,
}

impl ErrorKind {
    /// Stable code carried in wire `error` messages
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Signature => "SIGNATURE_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::KeyResolution => "KEY_RESOLUTION_ERROR",
            ErrorKind::SessionState => "SESSION_STATE_ERROR",
            ErrorKind::Transport => "TRANSPORT_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl UserOutcome {
    pub fn description(self) -> &'static str {
        match self {
            UserOutcome::SenderUnverified => "sender could not be verified",
            UserOutcome::Tampered => "message was tampered with",
            UserOutcome::NoKeyForPeer => "no key available for peer",
            UserOutcome::Other => "session failed",
        }
    }
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidKey { .. }
            | CryptoError::InvalidNonce { .. }
            | CryptoError::InvalidPayload { .. }
            | CryptoError::KeyDerivationFailed { .. } => ErrorKind::Validation,
            CryptoError::InvalidSignature { .. } => ErrorKind::Signature,
            CryptoError::DecryptionFailed { .. } => ErrorKind::Authentication,
            CryptoError::KeyResolutionFailed { .. } => ErrorKind::KeyResolution,
            CryptoError::SessionState { .. } | CryptoError::SessionKeyNotFound { .. } => {
                ErrorKind::SessionState
            }
            CryptoError::Transport { .. } => ErrorKind::Transport,
            CryptoError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn outcome(&self) -> UserOutcome {
        match self.kind() {
            ErrorKind::Signature => UserOutcome::SenderUnverified,
            ErrorKind::Authentication | ErrorKind::Validation | ErrorKind::SessionState => {
                UserOutcome::Tampered
            }
            ErrorKind::KeyResolution => UserOutcome::NoKeyForPeer,
            ErrorKind::Transport | ErrorKind::Internal => UserOutcome::Other,
        }
    }

    /// Only key discovery may be retried (e.g. against another registry endpoint).
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::KeyResolution
    }

    /// Verification and state failures terminate the session they occur in.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::Signature
                | ErrorKind::Authentication
                | ErrorKind::SessionState
        )
    }

    pub(crate) fn invalid_payload(field: &str, reason: impl Into<String>) -> Self {
        CryptoError::InvalidPayload {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_key(key_type: &str, reason: impl Into<String>) -> Self {
        CryptoError::InvalidKey {
            key_type: key_type.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_signature(operation: &str, reason: impl Into<String>) -> Self {
        CryptoError::InvalidSignature {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn session_state(session_id: &str, reason: impl Into<String>) -> Self {
        CryptoError::SessionState {
            session_id: session_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn key_resolution(address: &str, reason: impl Into<String>) -> Self {
        CryptoError::KeyResolutionFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(operation: &str, err: impl std::fmt::Display) -> Self {
        CryptoError::Transport {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for CryptoError {
    fn from(err: anyhow::Error) -> Self {
        CryptoError::Other(err.to_string())
    }
}

impl From<hex::FromHexError> for CryptoError {
    fn from(err: hex::FromHexError) -> Self {
        CryptoError::InvalidPayload {
            field: "hex_field".to_string(),
            reason: format!("hex decode error: {}", err),
        }
    }
}

impl From<k256::elliptic_curve::Error> for CryptoError {
    fn from(err: k256::elliptic_curve::Error) -> Self {
        CryptoError::InvalidKey {
            key_type: "unknown".to_string(),
            reason: format!("k256 error: {}", err),
        }
    }
}

impl From<chacha20poly1305::aead::Error> for CryptoError {
    fn from(err: chacha20poly1305::aead::Error) -> Self {
        CryptoError::DecryptionFailed {
            operation: "AEAD".to_string(),
            reason: format!("chacha20poly1305 error: {}", err),
        }
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::InvalidPayload {
            field: "json".to_string(),
            reason: format!("JSON error: {}", err),
        }
    }
}
