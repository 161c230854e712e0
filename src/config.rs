// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end encryption configuration
//!
//! Defaults suit production; each field can be overridden from the
//! environment (`FABSTIR_E2E_*`) or from the `[e2e]` table of a TOML file.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Encrypt new sessions unless the caller explicitly opts out
    pub encryption_enabled: bool,
    /// Accept inbound plaintext sessions (logged as a deprecated fallback)
    pub allow_plaintext_fallback: bool,
    /// Upper bound on one key-discovery round trip
    pub key_discovery_timeout_secs: u64,
    /// Reject inbound message indices that do not strictly increase
    pub strict_message_ordering: bool,
    /// Environment variable holding the long-term private key
    pub private_key_env: String,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            encryption_enabled: true,
            allow_plaintext_fallback: true,
            key_discovery_timeout_secs: 30,
            strict_message_ordering: true,
            private_key_env: "FABSTIR_PRIVATE_KEY".to_string(),
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => {
            warn!("Ignoring invalid boolean in {}: {}", name, value);
            None
        }
    }
}

impl E2eConfig {
    /// Load from environment variables on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = env_bool("FABSTIR_E2E_ENCRYPTION") {
            config.encryption_enabled = enabled;
        }
        if let Some(allow) = env_bool("FABSTIR_E2E_ALLOW_PLAINTEXT") {
            config.allow_plaintext_fallback = allow;
        }
        if let Some(strict) = env_bool("FABSTIR_E2E_STRICT_ORDERING") {
            config.strict_message_ordering = strict;
        }
        if let Ok(timeout) = env::var("FABSTIR_E2E_KEY_DISCOVERY_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) if secs > 0 => config.key_discovery_timeout_secs = secs,
                _ => warn!(
                    "Ignoring invalid FABSTIR_E2E_KEY_DISCOVERY_TIMEOUT: {}",
                    timeout
                ),
            }
        }
        if let Ok(var) = env::var("FABSTIR_E2E_PRIVATE_KEY_ENV") {
            config.private_key_env = var;
        }

        config
    }

    /// Load configuration from the `[e2e]` table of a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_value: toml::Value = toml::from_str(content)?;

        let config = match toml_value.get("e2e") {
            Some(table) => table.clone().try_into::<E2eConfig>()?,
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_discovery_timeout_secs == 0 {
            return Err(anyhow!("key_discovery_timeout_secs must be greater than 0"));
        }
        if self.private_key_env.trim().is_empty() {
            return Err(anyhow!("private_key_env cannot be empty"));
        }
        Ok(())
    }

    pub fn key_discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.key_discovery_timeout_secs)
    }
}
