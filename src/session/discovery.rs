// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Peer Public-Key Discovery
//!
//! Resolves a peer's static public key from its address in three tiers:
//!
//! 1. **Cache**: keys already verified in this process
//! 2. **Registry**: key advertised in host registry metadata
//! 3. **Challenge**: interactive signature over a random challenge
//!
//! Every key is checked against the expected address before it is trusted
//! or cached. A key that fails that check ends discovery with
//! `KeyResolutionFailed`; later tiers are not consulted.
//!
//! **Security**: the cache only ever holds verified keys and lives in memory
//! for the process lifetime.

use super::challenge::{new_challenge, verify_challenge_response, ChallengeResponse};
use super::channel::{SessionChannel, WireMessage};
use crate::crypto::ecdh::{compress_public_key, parse_public_key};
use crate::crypto::signature::address_from_public_key;
use crate::crypto::{addresses_match, CryptoError};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Verify that `public_key` belongs to `address` and return it compressed
fn verified_key(address: &str, public_key: &[u8], source: &str) -> Result<[u8; 33], CryptoError> {
    let parsed = parse_public_key(public_key, "peer_public_key").map_err(|e| {
        CryptoError::key_resolution(address, format!("{} returned a malformed key: {}", source, e))
    })?;

    let derived = address_from_public_key(&parsed);
    if !addresses_match(&derived, address) {
        return Err(CryptoError::key_resolution(
            address,
            format!("{} key belongs to {}", source, derived),
        ));
    }

    Ok(compress_public_key(&parsed))
}

fn is_address(address: &str) -> bool {
    let hex = address.strip_prefix("0x").unwrap_or(address);
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Process-wide cache of verified peer public keys, keyed by address
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct PeerKeyCache {
    keys: Arc<RwLock<HashMap<String, [u8; 33]>>>,
}

impl PeerKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(address: &str) -> String {
        address.trim_start_matches("0x").to_lowercase()
    }

    pub async fn get(&self, address: &str) -> Option<[u8; 33]> {
        let keys = self.keys.read().await;
        keys.get(&Self::normalize(address)).copied()
    }

    /// Insert a key after verifying it against `address`
    ///
    /// Concurrent first insertions of the same key are harmless. A key that
    /// differs from the cached one is rejected.
    pub async fn insert(&self, address: &str, public_key: &[u8]) -> Result<[u8; 33], CryptoError> {
        let key = verified_key(address, public_key, "cache insert")?;

        let mut keys = self.keys.write().await;
        match keys.entry(Self::normalize(address)) {
            Entry::Occupied(existing) => {
                if existing.get() != &key {
                    return Err(CryptoError::key_resolution(
                        address,
                        "key conflicts with previously verified key",
                    ));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(key);
                info!(
                    "🔑 Peer key cached for {} (total keys: {})",
                    address,
                    keys.len()
                );
            }
        }
        Ok(key)
    }

    pub async fn remove(&self, address: &str) -> bool {
        let mut keys = self.keys.write().await;
        keys.remove(&Self::normalize(address)).is_some()
    }

    pub async fn count(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn clear(&self) {
        let mut keys = self.keys.write().await;
        let count = keys.len();
        keys.clear();
        if count > 0 {
            info!("🗑️  Cleared {} cached peer keys", count);
        }
    }
}

/// Registry metadata for a host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRecord {
    /// Advertised public key, compressed or uncompressed
    pub public_key: Option<Vec<u8>>,
    pub endpoint: Option<String>,
}

/// Address → metadata lookup (e.g. an on-chain node registry)
#[async_trait]
pub trait HostRegistry: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<Option<HostRecord>>;
}

/// Interactive challenge transport
#[async_trait]
pub trait KeyChallenger: Send + Sync {
    async fn challenge(&self, address: &str, challenge: [u8; 32]) -> Result<ChallengeResponse>;
}

/// Runs the challenge exchange over an already-connected session channel
pub struct ChannelKeyChallenger<'a> {
    channel: &'a dyn SessionChannel,
}

impl<'a> ChannelKeyChallenger<'a> {
    pub fn new(channel: &'a dyn SessionChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl<'a> KeyChallenger for ChannelKeyChallenger<'a> {
    async fn challenge(&self, address: &str, challenge: [u8; 32]) -> Result<ChallengeResponse> {
        debug!("Sending key challenge to {}", address);
        self.channel
            .send(WireMessage::KeyChallenge {
                challenge: challenge.to_vec(),
            })
            .await?;

        match self.channel.receive().await? {
            Some(WireMessage::KeyChallengeResponse {
                signature,
                recovery_id,
            }) => Ok(ChallengeResponse {
                signature,
                recovery_id,
            }),
            Some(WireMessage::Error { code, message, .. }) => {
                Err(anyhow!("peer refused challenge ({}): {}", code, message))
            }
            Some(other) => Err(anyhow!(
                "expected key_challenge_response, got {}",
                other.type_name()
            )),
            None => Err(anyhow!("channel closed during key challenge")),
        }
    }
}

/// Which tier produced a resolved key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Cache,
    Registry,
    Challenge,
}

/// Three-tier resolver: cache, then registry, then challenge
#[derive(Clone)]
pub struct PeerKeyResolver {
    cache: PeerKeyCache,
    registry: Option<Arc<dyn HostRegistry>>,
    timeout: Duration,
}

impl PeerKeyResolver {
    pub fn new(cache: PeerKeyCache) -> Self {
        Self {
            cache,
            registry: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn HostRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &PeerKeyCache {
        &self.cache
    }

    async fn lookup_registry(&self, address: &str) -> Option<HostRecord> {
        let registry = self.registry.as_ref()?;
        match timeout(self.timeout, registry.lookup(address)).await {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                warn!("Registry lookup for {} failed: {}", address, e);
                None
            }
            Err(_) => {
                warn!(
                    "Registry lookup for {} timed out after {:?}",
                    address, self.timeout
                );
                None
            }
        }
    }

    /// Network endpoint advertised by the registry, if any
    pub async fn lookup_endpoint(&self, address: &str) -> Option<String> {
        self.lookup_registry(address).await?.endpoint
    }

    /// Resolve `address` to a verified compressed public key
    ///
    /// `challenger` is the last resort; pass `None` to disable the
    /// interactive tier.
    pub async fn resolve(
        &self,
        address: &str,
        challenger: Option<&dyn KeyChallenger>,
    ) -> Result<([u8; 33], KeySource), CryptoError> {
        if !is_address(address) {
            return Err(CryptoError::key_resolution(address, "not a 20-byte hex address"));
        }

        if let Some(key) = self.cache.get(address).await {
            debug!("Peer key for {} served from cache", address);
            return Ok((key, KeySource::Cache));
        }

        if let Some(public_key) = self
            .lookup_registry(address)
            .await
            .and_then(|record| record.public_key)
        {
            let key = self.cache.insert(address, &public_key).await?;
            info!("✅ Peer key for {} resolved from registry", address);
            return Ok((key, KeySource::Registry));
        }

        let challenger = challenger.ok_or_else(|| {
            CryptoError::key_resolution(address, "no cached or registry key and no challenger")
        })?;

        let challenge = new_challenge();
        let response = match timeout(self.timeout, challenger.challenge(address, challenge)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(CryptoError::key_resolution(
                    address,
                    format!("key challenge failed: {}", e),
                ))
            }
            Err(_) => {
                return Err(CryptoError::key_resolution(
                    address,
                    format!("key challenge timed out after {:?}", self.timeout),
                ))
            }
        };

        let recovered = verify_challenge_response(&challenge, &response, address)?;
        let key = self.cache.insert(address, &recovered).await?;
        info!("✅ Peer key for {} resolved by challenge", address);
        Ok((key, KeySource::Challenge))
    }
}
