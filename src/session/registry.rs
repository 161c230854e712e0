// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session Registry
//!
//! Owns every session of one party, keyed by an opaque session id. Each
//! session sits behind its own mutex, so counter assignment, encryption and
//! the channel send for one message happen as a single critical section.
//!
//! Failure policy:
//!
//! - Verification, decryption and state failures are terminal: the session
//!   moves to `Failed`, its key is dropped, the peer is told and the channel
//!   is closed. Nothing is retried.
//! - Key-resolution failures abandon only the start attempt; the caller may
//!   retry.
//! - Plaintext sessions exist only as an explicit, logged opt-out.
//!
//! A session is bound to the channel it was created on. Frames naming it
//! that arrive on any other channel are treated as naming an unknown session
//! and never touch it.

use super::challenge::respond_to_challenge;
use super::channel::{MalformedFrame, SessionChannel, WireMessage};
use super::discovery::{ChannelKeyChallenger, PeerKeyResolver};
use super::state::{EncryptionMode, SessionEntry, SessionInfo, SessionRole, SessionState};
use crate::config::E2eConfig;
use crate::crypto::{
    CryptoError, EncryptionManager, Identity, MessageEnvelope, SessionInitEnvelope,
    SessionInitPayload,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type SessionMap = HashMap<String, Arc<SessionSlot>>;

/// Parameters for opening a session as initiator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSession {
    pub peer_address: String,
    pub job_id: u64,
    pub model_name: String,
    pub price_per_token: u64,
    pub chain_id: Option<u64>,
    /// Connect the channel here before negotiating
    pub endpoint: Option<String>,
    /// `Some(false)` opts this session out of encryption; `None` follows config
    pub encryption: Option<bool>,
}

impl StartSession {
    pub fn new(peer_address: impl Into<String>, job_id: u64, model_name: impl Into<String>) -> Self {
        Self {
            peer_address: peer_address.into(),
            job_id,
            model_name: model_name.into(),
            price_per_token: 0,
            chain_id: None,
            endpoint: None,
            encryption: None,
        }
    }

    pub fn with_price(mut self, price_per_token: u64) -> Self {
        self.price_per_token = price_per_token;
        self
    }

    pub fn with_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn without_encryption(mut self) -> Self {
        self.encryption = Some(false);
        self
    }
}

/// What an inbound wire message did to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    SessionOpened {
        session_id: String,
        peer_address: Option<String>,
        job_id: u64,
        model_name: String,
        mode: EncryptionMode,
    },
    Message {
        session_id: String,
        content: String,
        /// `None` for plaintext sessions
        message_index: Option<u64>,
    },
    ChallengeAnswered,
    SessionClosed {
        session_id: String,
    },
    PeerError {
        session_id: Option<String>,
        code: String,
        message: String,
    },
}

struct SessionSlot {
    /// Channel the session was created on
    channel_id: Uuid,
    /// Set before the entry lock is taken so in-flight work sees cancellation
    cancelled: AtomicBool,
    /// The `start_session` call that owned this slot was dropped
    abandoned: AtomicBool,
    entry: Mutex<SessionEntry>,
}

impl SessionSlot {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// Cleans up after a `start_session` future that is dropped mid-negotiation
struct PendingStart<'a> {
    sessions: &'a RwLock<SessionMap>,
    slot: Arc<SessionSlot>,
    session_id: String,
    armed: bool,
}

impl PendingStart<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        self.slot.cancelled.store(true, Ordering::SeqCst);
        self.slot.abandoned.store(true, Ordering::SeqCst);
        if let Ok(mut entry) = self.slot.entry.try_lock() {
            entry.fail("start abandoned before negotiation completed");
        }

        // Drop cannot await; a contended map is swept by remove_terminated
        match self.sessions.try_write() {
            Ok(mut sessions) => {
                sessions.remove(&self.session_id);
                warn!("Session {} abandoned during negotiation", self.session_id);
            }
            Err(_) => warn!(
                "Session {} abandoned during negotiation, left for remove_terminated",
                self.session_id
            ),
        }
    }
}

pub struct SessionRegistry {
    manager: EncryptionManager,
    resolver: PeerKeyResolver,
    config: E2eConfig,
    sessions: RwLock<SessionMap>,
}

impl SessionRegistry {
    pub fn new(identity: Identity, resolver: PeerKeyResolver, config: E2eConfig) -> Self {
        let resolver = resolver.with_timeout(config.key_discovery_timeout());
        info!(
            "Session registry ready for {} (encryption default: {}, strict ordering: {})",
            identity.address(),
            config.encryption_enabled,
            config.strict_message_ordering
        );
        Self {
            manager: EncryptionManager::new(identity),
            resolver,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &EncryptionManager {
        &self.manager
    }

    pub fn resolver(&self) -> &PeerKeyResolver {
        &self.resolver
    }

    async fn insert_slot(
        &self,
        channel: &dyn SessionChannel,
        entry: SessionEntry,
    ) -> Result<Arc<SessionSlot>, CryptoError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&entry.session_id) {
            return Err(CryptoError::session_state(
                &entry.session_id,
                "session id already in use",
            ));
        }
        let session_id = entry.session_id.clone();
        let slot = Arc::new(SessionSlot {
            channel_id: channel.id(),
            cancelled: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
            entry: Mutex::new(entry),
        });
        sessions.insert(session_id, slot.clone());
        Ok(slot)
    }

    async fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, CryptoError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| CryptoError::SessionKeyNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Look up a session on behalf of a frame received on `channel`
    async fn owned_slot(
        &self,
        channel: &dyn SessionChannel,
        session_id: &str,
    ) -> Result<Arc<SessionSlot>, CryptoError> {
        let slot = self.slot(session_id).await?;
        if slot.channel_id != channel.id() {
            warn!(
                "Ignoring frame for session {} from a channel that does not own it",
                session_id
            );
            return Err(CryptoError::SessionKeyNotFound {
                session_id: session_id.to_string(),
            });
        }
        Ok(slot)
    }

    async fn discard(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// Fail the session, tell the peer and close the channel
    async fn terminate(
        &self,
        channel: Option<&dyn SessionChannel>,
        entry: &mut SessionEntry,
        err: &CryptoError,
    ) {
        if entry.state().is_terminal() {
            return;
        }

        error!(
            "❌ Session {} failed ({:?}): {}",
            entry.session_id,
            err.kind(),
            err
        );
        entry.fail(err.to_string());

        if let Some(channel) = channel {
            let notice = WireMessage::Error {
                session_id: Some(entry.session_id.clone()),
                code: err.kind().code().to_string(),
                message: err.outcome().description().to_string(),
            };
            if let Err(e) = channel.send(notice).await {
                warn!("Failed to notify peer of session {} failure: {}", entry.session_id, e);
            }
            if let Err(e) = channel.close().await {
                warn!("Failed to close channel for session {}: {}", entry.session_id, e);
            }
        }
    }

    /// Open a session to `request.peer_address`, returning its id once `Active`
    pub async fn start_session(
        &self,
        channel: &dyn SessionChannel,
        request: StartSession,
    ) -> Result<String, CryptoError> {
        let session_id = Uuid::new_v4().to_string();
        let mode = if request.encryption.unwrap_or(self.config.encryption_enabled) {
            EncryptionMode::Encrypted
        } else {
            EncryptionMode::Plaintext
        };

        let mut entry = SessionEntry::new(
            &session_id,
            SessionRole::Initiator,
            mode,
            self.config.strict_message_ordering,
        );
        entry.peer_address = Some(request.peer_address.clone());
        entry.job_id = request.job_id;
        entry.model_name = request.model_name.clone();

        let slot = self.insert_slot(channel, entry).await?;
        let pending = PendingStart {
            sessions: &self.sessions,
            slot: slot.clone(),
            session_id: session_id.clone(),
            armed: true,
        };
        let mut entry = slot.entry.lock().await;

        let result = match self.negotiate(channel, &slot, &mut entry, &request).await {
            Ok(()) => Ok(session_id),
            Err(e) if e.is_fatal_to_session() => {
                self.terminate(Some(channel), &mut entry, &e).await;
                Err(e)
            }
            Err(e) => {
                warn!("Session {} not started: {}", session_id, e);
                drop(entry);
                self.discard(&session_id).await;
                Err(e)
            }
        };
        pending.disarm();
        result
    }

    async fn negotiate(
        &self,
        channel: &dyn SessionChannel,
        slot: &SessionSlot,
        entry: &mut SessionEntry,
        request: &StartSession,
    ) -> Result<(), CryptoError> {
        if let Some(endpoint) = &request.endpoint {
            channel
                .connect(endpoint)
                .await
                .map_err(|e| CryptoError::transport("connect", e))?;
        }

        if entry.mode == EncryptionMode::Plaintext {
            warn!(
                "⚠️  Session {} started WITHOUT encryption (explicit opt-out)",
                entry.session_id
            );
            channel
                .send(WireMessage::SessionInit {
                    session_id: entry.session_id.clone(),
                    job_id: request.job_id,
                    model_name: request.model_name.clone(),
                    price_per_token: request.price_per_token,
                })
                .await
                .map_err(|e| CryptoError::transport("session_init", e))?;
            return entry.activate(None);
        }

        entry.begin_negotiation()?;

        let challenger = ChannelKeyChallenger::new(channel);
        let (peer_pub, source) = self
            .resolver
            .resolve(&request.peer_address, Some(&challenger))
            .await?;
        debug!(
            "Peer key for session {} resolved via {:?}",
            entry.session_id, source
        );

        let mut payload =
            SessionInitPayload::new(&entry.session_id, request.job_id, &request.model_name)
                .with_price(request.price_per_token);
        if let Some(chain_id) = request.chain_id {
            payload = payload.with_chain(chain_id);
        }
        let envelope = self.manager.encrypt_session_init(&peer_pub, &payload)?;

        if slot.is_cancelled() {
            return Err(CryptoError::session_state(
                &entry.session_id,
                "cancelled during negotiation",
            ));
        }

        channel
            .send(WireMessage::EncryptedSessionInit {
                session_id: entry.session_id.clone(),
                payload: envelope,
            })
            .await
            .map_err(|e| CryptoError::transport("encrypted_session_init", e))?;

        entry.activate(Some(payload.session_key.clone()))?;
        info!(
            "🔐 Encrypted session {} active with {} (job {})",
            entry.session_id, request.peer_address, request.job_id
        );
        Ok(())
    }

    /// Accept an encrypted session init as responder
    pub async fn accept_session(
        &self,
        channel: &dyn SessionChannel,
        session_id: &str,
        envelope: &SessionInitEnvelope,
    ) -> Result<InboundEvent, CryptoError> {
        let slot = self
            .insert_slot(
                channel,
                SessionEntry::new(
                    session_id,
                    SessionRole::Responder,
                    EncryptionMode::Encrypted,
                    self.config.strict_message_ordering,
                ),
            )
            .await?;
        let mut entry = slot.entry.lock().await;

        if let Err(e) = self.open_session_init(&mut entry, envelope) {
            self.terminate(Some(channel), &mut entry, &e).await;
            return Err(e);
        }

        info!(
            "🔐 Encrypted session {} accepted from {} (job {}, model {})",
            session_id,
            entry.peer_address.as_deref().unwrap_or("unknown"),
            entry.job_id,
            entry.model_name
        );

        Ok(InboundEvent::SessionOpened {
            session_id: session_id.to_string(),
            peer_address: entry.peer_address.clone(),
            job_id: entry.job_id,
            model_name: entry.model_name.clone(),
            mode: EncryptionMode::Encrypted,
        })
    }

    fn open_session_init(
        &self,
        entry: &mut SessionEntry,
        envelope: &SessionInitEnvelope,
    ) -> Result<(), CryptoError> {
        entry.begin_negotiation()?;
        let (payload, sender_address) = self.manager.decrypt_session_init(envelope)?;

        if payload.session_id != entry.session_id {
            return Err(CryptoError::session_state(
                &entry.session_id,
                format!("sealed session id {} does not match", payload.session_id),
            ));
        }

        entry.peer_address = Some(sender_address);
        entry.job_id = payload.job_id;
        entry.model_name = payload.model_name.clone();
        entry.activate(Some(payload.session_key.clone()))
    }

    async fn accept_plaintext_session(
        &self,
        channel: &dyn SessionChannel,
        session_id: &str,
        job_id: u64,
        model_name: &str,
    ) -> Result<InboundEvent, CryptoError> {
        if !self.config.allow_plaintext_fallback {
            let err = CryptoError::session_state(session_id, "plaintext sessions are disabled");
            warn!("Rejected plaintext session_init for session {}", session_id);
            let notice = WireMessage::Error {
                session_id: Some(session_id.to_string()),
                code: err.kind().code().to_string(),
                message: "encryption required".to_string(),
            };
            if let Err(e) = channel.send(notice).await {
                warn!("Failed to notify peer: {}", e);
            }
            return Err(err);
        }

        warn!(
            "⚠️  DEPRECATED: plaintext session_init for session {}, encryption is strongly recommended",
            session_id
        );

        let mut entry = SessionEntry::new(
            session_id,
            SessionRole::Responder,
            EncryptionMode::Plaintext,
            self.config.strict_message_ordering,
        );
        entry.job_id = job_id;
        entry.model_name = model_name.to_string();
        entry.activate(None)?;
        self.insert_slot(channel, entry).await?;

        Ok(InboundEvent::SessionOpened {
            session_id: session_id.to_string(),
            peer_address: None,
            job_id,
            model_name: model_name.to_string(),
            mode: EncryptionMode::Plaintext,
        })
    }

    /// Encrypt (or, for opted-out sessions, pass through) and send one message
    ///
    /// Returns the message index the text was bound to.
    pub async fn send_message(
        &self,
        channel: &dyn SessionChannel,
        session_id: &str,
        text: &str,
    ) -> Result<u64, CryptoError> {
        let slot = self.slot(session_id).await?;
        let mut entry = slot.entry.lock().await;

        match self.send_locked(channel, &slot, &mut entry, text).await {
            Ok(index) => Ok(index),
            Err(e) => {
                self.terminate(Some(channel), &mut entry, &e).await;
                Err(e)
            }
        }
    }

    async fn send_locked(
        &self,
        channel: &dyn SessionChannel,
        slot: &SessionSlot,
        entry: &mut SessionEntry,
        text: &str,
    ) -> Result<u64, CryptoError> {
        entry.ensure_active()?;

        let index = entry.next_outbound_index();
        let message = match entry.mode {
            EncryptionMode::Encrypted => WireMessage::EncryptedMessage {
                session_id: entry.session_id.clone(),
                payload: self.manager.encrypt_message(
                    entry.session_key()?,
                    text.as_bytes(),
                    index,
                    entry.role.outbound_direction(),
                )?,
            },
            EncryptionMode::Plaintext => WireMessage::PlaintextMessage {
                session_id: entry.session_id.clone(),
                content: text.to_string(),
            },
        };

        if slot.is_cancelled() {
            return Err(CryptoError::session_state(
                &entry.session_id,
                "cancelled before send",
            ));
        }

        channel
            .send(message)
            .await
            .map_err(|e| CryptoError::transport("send_message", e))?;

        debug!("Sent message {} on session {}", index, entry.session_id);
        Ok(index)
    }

    async fn receive_encrypted(
        &self,
        channel: &dyn SessionChannel,
        session_id: &str,
        envelope: &MessageEnvelope,
    ) -> Result<InboundEvent, CryptoError> {
        let slot = self.owned_slot(channel, session_id).await?;
        let mut entry = slot.entry.lock().await;

        match self.open_message(&mut entry, envelope) {
            Ok((content, index)) => Ok(InboundEvent::Message {
                session_id: session_id.to_string(),
                content,
                message_index: Some(index),
            }),
            Err(e) => {
                self.terminate(Some(channel), &mut entry, &e).await;
                Err(e)
            }
        }
    }

    fn open_message(
        &self,
        entry: &mut SessionEntry,
        envelope: &MessageEnvelope,
    ) -> Result<(String, u64), CryptoError> {
        entry.ensure_active()?;
        if entry.mode != EncryptionMode::Encrypted {
            return Err(CryptoError::session_state(
                &entry.session_id,
                "encrypted message on a plaintext session",
            ));
        }

        let decrypted = self.manager.decrypt_message(entry.session_key()?, envelope)?;

        if decrypted.aad.direction != entry.role.inbound_direction() {
            return Err(CryptoError::session_state(
                &entry.session_id,
                "message direction does not match (reflected message)",
            ));
        }
        entry.accept_inbound(decrypted.aad.message_index)?;

        let content = String::from_utf8(decrypted.plaintext.to_vec())
            .map_err(|_| CryptoError::invalid_payload("content", "message is not valid UTF-8"))?;

        debug!(
            "Received message {} on session {}",
            decrypted.aad.message_index, entry.session_id
        );
        Ok((content, decrypted.aad.message_index))
    }

    async fn receive_plaintext(
        &self,
        channel: &dyn SessionChannel,
        session_id: &str,
        content: String,
    ) -> Result<InboundEvent, CryptoError> {
        let slot = self.owned_slot(channel, session_id).await?;
        let mut entry = slot.entry.lock().await;

        let result = entry.ensure_active().and_then(|_| match entry.mode {
            EncryptionMode::Plaintext => Ok(()),
            EncryptionMode::Encrypted => Err(CryptoError::session_state(
                session_id,
                "plaintext message on an encrypted session",
            )),
        });

        if let Err(e) = result {
            self.terminate(Some(channel), &mut entry, &e).await;
            return Err(e);
        }

        entry.note_plaintext_received();
        Ok(InboundEvent::Message {
            session_id: session_id.to_string(),
            content,
            message_index: None,
        })
    }

    /// Dispatch one inbound wire message
    pub async fn handle_inbound(
        &self,
        channel: &dyn SessionChannel,
        message: WireMessage,
    ) -> Result<InboundEvent, CryptoError> {
        match message {
            WireMessage::EncryptedSessionInit {
                session_id,
                payload,
            } => self.accept_session(channel, &session_id, &payload).await,
            WireMessage::SessionInit {
                session_id,
                job_id,
                model_name,
                ..
            } => {
                self.accept_plaintext_session(channel, &session_id, job_id, &model_name)
                    .await
            }
            WireMessage::EncryptedMessage {
                session_id,
                payload,
            } => self.receive_encrypted(channel, &session_id, &payload).await,
            WireMessage::PlaintextMessage {
                session_id,
                content,
            } => self.receive_plaintext(channel, &session_id, content).await,
            WireMessage::KeyChallenge { challenge } => {
                self.answer_key_challenge(channel, &challenge).await?;
                Ok(InboundEvent::ChallengeAnswered)
            }
            WireMessage::KeyChallengeResponse { .. } => Err(CryptoError::invalid_payload(
                "type",
                "unsolicited key_challenge_response",
            )),
            WireMessage::SessionEnd { session_id } => {
                let slot = self.owned_slot(channel, &session_id).await?;
                slot.cancelled.store(true, Ordering::SeqCst);
                slot.entry.lock().await.close();
                info!("🔒 Session {} closed by peer", session_id);
                Ok(InboundEvent::SessionClosed { session_id })
            }
            WireMessage::Error {
                session_id,
                code,
                message,
            } => {
                if let Some(id) = &session_id {
                    if let Ok(slot) = self.owned_slot(channel, id).await {
                        slot.cancelled.store(true, Ordering::SeqCst);
                        slot.entry
                            .lock()
                            .await
                            .fail(format!("peer reported {}: {}", code, message));
                    }
                }
                warn!("Peer reported {} for session {:?}: {}", code, session_id, message);
                Ok(InboundEvent::PeerError {
                    session_id,
                    code,
                    message,
                })
            }
        }
    }

    /// Receive and dispatch the next message; `None` when the channel is done
    pub async fn receive_message(
        &self,
        channel: &dyn SessionChannel,
    ) -> Result<Option<InboundEvent>, CryptoError> {
        let frame = match channel
            .receive_frame()
            .await
            .map_err(|e| CryptoError::transport("receive", e))?
        {
            Some(frame) => frame,
            None => return Ok(None),
        };

        match WireMessage::decode(&frame) {
            Ok(message) => self.handle_inbound(channel, message).await.map(Some),
            Err(malformed) => Err(self.reject_malformed(channel, malformed).await),
        }
    }

    /// A frame whose body does not decode is terminal for the session it names
    async fn reject_malformed(
        &self,
        channel: &dyn SessionChannel,
        malformed: MalformedFrame,
    ) -> CryptoError {
        let err = CryptoError::invalid_payload(
            malformed.message_type.as_deref().unwrap_or("frame"),
            malformed.reason.clone(),
        );

        match &malformed.session_id {
            Some(session_id) => {
                if let Ok(slot) = self.owned_slot(channel, session_id).await {
                    let mut entry = slot.entry.lock().await;
                    self.terminate(Some(channel), &mut entry, &err).await;
                }
            }
            None => warn!("Dropping {}", malformed),
        }
        err
    }

    /// Prove this party's identity by signing the peer's challenge
    pub async fn answer_key_challenge(
        &self,
        channel: &dyn SessionChannel,
        challenge: &[u8],
    ) -> Result<(), CryptoError> {
        let response = match respond_to_challenge(self.manager.identity(), challenge) {
            Ok(response) => response,
            Err(e) => {
                let notice = WireMessage::Error {
                    session_id: None,
                    code: e.kind().code().to_string(),
                    message: "invalid key challenge".to_string(),
                };
                if let Err(send_err) = channel.send(notice).await {
                    warn!("Failed to reject key challenge: {}", send_err);
                }
                return Err(e);
            }
        };

        channel
            .send(WireMessage::KeyChallengeResponse {
                signature: response.signature,
                recovery_id: response.recovery_id,
            })
            .await
            .map_err(|e| CryptoError::transport("key_challenge_response", e))?;

        info!("🔏 Answered key challenge as {}", self.manager.address());
        Ok(())
    }

    /// Close a session normally; its key is dropped before this returns
    pub async fn close_session(
        &self,
        channel: &dyn SessionChannel,
        session_id: &str,
    ) -> Result<(), CryptoError> {
        let slot = self.slot(session_id).await?;
        slot.cancelled.store(true, Ordering::SeqCst);

        let mut entry = slot.entry.lock().await;
        if entry.state().is_terminal() {
            return Ok(());
        }
        entry.close();
        info!("🔒 Session {} closed", session_id);

        if let Err(e) = channel
            .send(WireMessage::SessionEnd {
                session_id: session_id.to_string(),
            })
            .await
        {
            warn!("Failed to send session_end for {}: {}", session_id, e);
        }
        Ok(())
    }

    /// Tear a session down as failed, e.g. on a caller-detected protocol violation
    pub async fn fail_session(
        &self,
        channel: Option<&dyn SessionChannel>,
        session_id: &str,
        reason: &str,
    ) -> Result<(), CryptoError> {
        let slot = self.slot(session_id).await?;
        slot.cancelled.store(true, Ordering::SeqCst);

        let mut entry = slot.entry.lock().await;
        let err = CryptoError::session_state(session_id, reason);
        self.terminate(channel, &mut entry, &err).await;
        Ok(())
    }

    pub async fn state(&self, session_id: &str) -> Option<SessionState> {
        let slot = self.slot(session_id).await.ok()?;
        let entry = slot.entry.lock().await;
        Some(entry.state())
    }

    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let slot = self.slot(session_id).await.ok()?;
        let entry = slot.entry.lock().await;
        Some(entry.info())
    }

    fn snapshot(sessions: &SessionMap) -> Vec<(String, Arc<SessionSlot>)> {
        sessions
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect()
    }

    /// Sessions held in any state, including closed and failed ones
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn active_count(&self) -> usize {
        let slots = Self::snapshot(&*self.sessions.read().await);
        let mut count = 0;
        for (_, slot) in slots {
            if slot.entry.lock().await.state() == SessionState::Active {
                count += 1;
            }
        }
        count
    }

    /// Forget closed, failed and abandoned sessions, returning how many were removed
    pub async fn remove_terminated(&self) -> usize {
        let slots = Self::snapshot(&*self.sessions.read().await);
        let mut terminated = Vec::new();
        for (id, slot) in slots {
            if slot.is_abandoned() || slot.entry.lock().await.state().is_terminal() {
                terminated.push(id);
            }
        }

        let mut sessions = self.sessions.write().await;
        for id in &terminated {
            sessions.remove(id);
        }
        if !terminated.is_empty() {
            debug!("Removed {} terminated sessions", terminated.len());
        }
        terminated.len()
    }
}
