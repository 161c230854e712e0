// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-session state machine
//!
//! `Uninitialized → KeyNegotiating → Active → Closed | Failed`
//!
//! A plaintext session skips `KeyNegotiating`. `Closed` and `Failed` are
//! terminal: the session key is dropped (and wiped) on entry.

use crate::crypto::{CryptoError, Direction, SessionKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    KeyNegotiating,
    Active,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Uninitialized, KeyNegotiating) | (Uninitialized, Active) => true,
            (KeyNegotiating, Active) => true,
            (from, Closed) | (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::KeyNegotiating => "key_negotiating",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Initiator,
    Responder,
}

impl SessionRole {
    pub fn outbound_direction(self) -> Direction {
        match self {
            SessionRole::Initiator => Direction::InitiatorToResponder,
            SessionRole::Responder => Direction::ResponderToInitiator,
        }
    }

    pub fn inbound_direction(self) -> Direction {
        self.outbound_direction().opposite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMode {
    Encrypted,
    /// Explicit opt-out; never chosen silently
    Plaintext,
}

/// Read-only snapshot of a session, safe to hand to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub role: SessionRole,
    pub mode: EncryptionMode,
    pub state: SessionState,
    pub peer_address: Option<String>,
    pub job_id: u64,
    pub model_name: String,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub failure_reason: Option<String>,
}

/// Mutable session record owned by the registry
#[derive(Debug)]
pub(crate) struct SessionEntry {
    pub(crate) session_id: String,
    pub(crate) role: SessionRole,
    pub(crate) mode: EncryptionMode,
    state: SessionState,
    pub(crate) peer_address: Option<String>,
    pub(crate) job_id: u64,
    pub(crate) model_name: String,
    session_key: Option<SessionKey>,
    outbound_counter: u64,
    last_inbound: Option<u64>,
    messages_received: u64,
    strict_ordering: bool,
    failure_reason: Option<String>,
}

impl SessionEntry {
    pub(crate) fn new(
        session_id: impl Into<String>,
        role: SessionRole,
        mode: EncryptionMode,
        strict_ordering: bool,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            mode,
            state: SessionState::Uninitialized,
            peer_address: None,
            job_id: 0,
            model_name: String::new(),
            session_key: None,
            outbound_counter: 0,
            last_inbound: None,
            messages_received: 0,
            strict_ordering,
            failure_reason: None,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) -> Result<(), CryptoError> {
        if !self.state.can_transition_to(next) {
            return Err(CryptoError::session_state(
                &self.session_id,
                format!("cannot move from {} to {}", self.state, next),
            ));
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn begin_negotiation(&mut self) -> Result<(), CryptoError> {
        self.transition(SessionState::KeyNegotiating)
    }

    /// Enter `Active` with zeroed counters. Encrypted sessions require a key.
    pub(crate) fn activate(&mut self, session_key: Option<SessionKey>) -> Result<(), CryptoError> {
        if self.mode == EncryptionMode::Encrypted && session_key.is_none() {
            return Err(CryptoError::SessionKeyNotFound {
                session_id: self.session_id.clone(),
            });
        }
        self.transition(SessionState::Active)?;
        self.session_key = session_key;
        self.outbound_counter = 0;
        self.last_inbound = None;
        Ok(())
    }

    pub(crate) fn ensure_active(&self) -> Result<(), CryptoError> {
        if self.state != SessionState::Active {
            return Err(CryptoError::session_state(
                &self.session_id,
                format!("session is {}", self.state),
            ));
        }
        Ok(())
    }

    pub(crate) fn session_key(&self) -> Result<&SessionKey, CryptoError> {
        self.session_key
            .as_ref()
            .ok_or_else(|| CryptoError::SessionKeyNotFound {
                session_id: self.session_id.clone(),
            })
    }

    /// Claim the next outbound index. Indices start at zero.
    pub(crate) fn next_outbound_index(&mut self) -> u64 {
        let index = self.outbound_counter;
        self.outbound_counter += 1;
        index
    }

    /// Accept an authenticated inbound index, enforcing strict ordering when enabled
    pub(crate) fn accept_inbound(&mut self, index: u64) -> Result<(), CryptoError> {
        if self.strict_ordering {
            if let Some(last) = self.last_inbound {
                if index <= last {
                    return Err(CryptoError::session_state(
                        &self.session_id,
                        format!(
                            "message index {} replayed or out of order (last accepted {})",
                            index, last
                        ),
                    ));
                }
            }
        }
        self.last_inbound = Some(self.last_inbound.map_or(index, |last| last.max(index)));
        self.messages_received += 1;
        Ok(())
    }

    pub(crate) fn note_plaintext_received(&mut self) {
        self.messages_received += 1;
    }

    fn drop_key(&mut self) {
        // Zeroizing wipes the bytes on drop
        self.session_key = None;
        self.outbound_counter = 0;
        self.last_inbound = None;
    }

    /// Normal termination. Closing an already-terminal session is a no-op.
    pub(crate) fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Closed;
        self.drop_key();
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = SessionState::Failed;
        self.failure_reason = Some(reason.into());
        self.drop_key();
    }

    pub(crate) fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            role: self.role,
            mode: self.mode,
            state: self.state,
            peer_address: self.peer_address.clone(),
            job_id: self.job_id,
            model_name: self.model_name.clone(),
            messages_sent: self.outbound_counter,
            messages_received: self.messages_received,
            failure_reason: self.failure_reason.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn has_key(&self) -> bool {
        self.session_key.is_some()
    }
}
