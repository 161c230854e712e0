// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session channel abstraction and wire messages
//!
//! The channel transports JSON messages verbatim between the two parties.
//! Messages are tagged by `type`:
//!
//! - `encrypted_session_init` / `encrypted_message`: the encrypted path
//! - `session_init` / `plaintext_message`: deprecated plaintext fallback
//! - `key_challenge` / `key_challenge_response`: interactive key discovery
//! - `session_end` / `error`: teardown
//!
//! Frames are decoded in two steps: the `type` and `session_id` header
//! first, then the body. A body that fails to decode is still attributed to
//! the session it names.

use crate::crypto::hex_bytes;
use crate::crypto::{MessageEnvelope, SessionInitEnvelope};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    EncryptedSessionInit {
        session_id: String,
        payload: SessionInitEnvelope,
    },
    EncryptedMessage {
        session_id: String,
        payload: MessageEnvelope,
    },
    /// Plaintext session start (deprecated)
    SessionInit {
        session_id: String,
        job_id: u64,
        model_name: String,
        #[serde(default)]
        price_per_token: u64,
    },
    PlaintextMessage {
        session_id: String,
        content: String,
    },
    KeyChallenge {
        #[serde(with = "hex_bytes")]
        challenge: Vec<u8>,
    },
    KeyChallengeResponse {
        #[serde(with = "hex_bytes")]
        signature: Vec<u8>,
        recovery_id: u8,
    },
    SessionEnd {
        session_id: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        code: String,
        message: String,
    },
}

impl WireMessage {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            WireMessage::EncryptedSessionInit { session_id, .. }
            | WireMessage::EncryptedMessage { session_id, .. }
            | WireMessage::SessionInit { session_id, .. }
            | WireMessage::PlaintextMessage { session_id, .. }
            | WireMessage::SessionEnd { session_id } => Some(session_id),
            WireMessage::Error { session_id, .. } => session_id.as_deref(),
            WireMessage::KeyChallenge { .. } | WireMessage::KeyChallengeResponse { .. } => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            WireMessage::EncryptedSessionInit { .. } => "encrypted_session_init",
            WireMessage::EncryptedMessage { .. } => "encrypted_message",
            WireMessage::SessionInit { .. } => "session_init",
            WireMessage::PlaintextMessage { .. } => "plaintext_message",
            WireMessage::KeyChallenge { .. } => "key_challenge",
            WireMessage::KeyChallengeResponse { .. } => "key_challenge_response",
            WireMessage::SessionEnd { .. } => "session_end",
            WireMessage::Error { .. } => "error",
        }
    }
}

#[derive(Deserialize)]
struct FrameHeader {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// An inbound frame that could not be decoded into a `WireMessage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFrame {
    /// Present when the header decoded but the body did not
    pub message_type: Option<String>,
    pub session_id: Option<String>,
    pub reason: String,
}

impl fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message_type {
            Some(message_type) => write!(f, "malformed {} frame: {}", message_type, self.reason),
            None => write!(f, "malformed frame: {}", self.reason),
        }
    }
}

impl std::error::Error for MalformedFrame {}

impl WireMessage {
    /// Decode one JSON frame, keeping the header of a frame whose body is bad
    pub fn decode(frame: &str) -> std::result::Result<WireMessage, MalformedFrame> {
        let value: serde_json::Value =
            serde_json::from_str(frame).map_err(|e| MalformedFrame {
                message_type: None,
                session_id: None,
                reason: e.to_string(),
            })?;

        let header: FrameHeader =
            serde_json::from_value(value.clone()).map_err(|e| MalformedFrame {
                message_type: None,
                session_id: None,
                reason: e.to_string(),
            })?;

        serde_json::from_value(value).map_err(|e| MalformedFrame {
            message_type: Some(header.message_type),
            session_id: header.session_id,
            reason: e.to_string(),
        })
    }
}

/// Bidirectional transport between the two session parties
///
/// Implementations move JSON text frames; `send` and `receive` layer the
/// `WireMessage` codec on top.
#[async_trait]
pub trait SessionChannel: Send + Sync {
    /// Stable identity of this connection; sessions are bound to it
    fn id(&self) -> Uuid;

    async fn connect(&self, endpoint: &str) -> Result<()>;

    async fn send_frame(&self, frame: String) -> Result<()>;

    /// Next inbound frame, or `None` once the peer has gone away
    async fn receive_frame(&self) -> Result<Option<String>>;

    async fn close(&self) -> Result<()>;

    async fn send(&self, message: WireMessage) -> Result<()> {
        let frame = serde_json::to_string(&message)?;
        self.send_frame(frame).await
    }

    /// Next inbound message, or `None` once the peer has gone away
    async fn receive(&self) -> Result<Option<WireMessage>> {
        match self.receive_frame().await? {
            Some(frame) => Ok(Some(WireMessage::decode(&frame)?)),
            None => Ok(None),
        }
    }
}

/// In-process duplex channel backed by tokio mpsc
///
/// Messages cross the pair as serialized JSON, so both ends see exactly the
/// bytes a network transport would carry.
pub struct MemoryChannel {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    endpoint: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// Create two connected ends
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: mpsc::UnboundedSender<String>, rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            rx: Mutex::new(rx),
            endpoint: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver a raw frame to the peer, bypassing serialization
    pub fn send_raw(&self, frame: impl Into<String>) -> Result<()> {
        if self.is_closed() {
            return Err(anyhow!("channel closed"));
        }
        self.tx
            .send(frame.into())
            .map_err(|_| anyhow!("peer disconnected"))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn endpoint(&self) -> Option<String> {
        self.endpoint.lock().await.clone()
    }
}

#[async_trait]
impl SessionChannel for MemoryChannel {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn connect(&self, endpoint: &str) -> Result<()> {
        if self.is_closed() {
            return Err(anyhow!("channel closed"));
        }
        *self.endpoint.lock().await = Some(endpoint.to_string());
        debug!("Memory channel connected to {}", endpoint);
        Ok(())
    }

    async fn send_frame(&self, frame: String) -> Result<()> {
        self.send_raw(frame)
    }

    async fn receive_frame(&self) -> Result<Option<String>> {
        if self.is_closed() {
            return Ok(None);
        }
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Memory channel closed");
        }
        Ok(())
    }
}
