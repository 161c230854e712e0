// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session lifecycle
//!
//! Drives each session through `Uninitialized → KeyNegotiating → Active →
//! Closed | Failed` on top of the crypto layer:
//!
//! - `discovery` / `challenge`: resolve and verify the peer's static key
//! - `channel`: wire messages and the transport abstraction
//! - `registry`: the arena that owns all sessions of one party
//!
//! Do not run a receive loop on a channel while `start_session` is
//! negotiating on it; the key challenge reads its response from that channel.

pub mod challenge;
pub mod channel;
pub mod discovery;
pub mod registry;
pub mod state;

pub use challenge::{respond_to_challenge, verify_challenge_response, ChallengeResponse};
pub use channel::{MalformedFrame, MemoryChannel, SessionChannel, WireMessage};
pub use discovery::{
    ChannelKeyChallenger, HostRecord, HostRegistry, KeyChallenger, KeySource, PeerKeyCache,
    PeerKeyResolver,
};
pub use registry::{InboundEvent, SessionRegistry, StartSession};
pub use state::{EncryptionMode, SessionInfo, SessionRole, SessionState};
