//! Configuration for the registry daemon.
//!
//! Resolution order: defaults → config file → `LIGHTHOUSE_*` env
//! overrides. CLI flags are applied on top by the daemon.
//!
//! Config file location:
//!   1. $LIGHTHOUSE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lighthouse/config.toml
//!   3. ~/.config/lighthouse/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LighthouseConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub stake: StakeConfig,
    pub semantic: SemanticConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to a 32-byte Ed25519 key file. Empty = ephemeral key.
    pub key_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port for the p2p endpoint.
    pub p2p_port: u16,
    /// REST API port. Avoid restricted ports like 6000.
    pub api_port: u16,
    /// DHT bootstrap node, `host:port`. Empty = well-known nodes only.
    pub bootstrap: String,
    /// LAN/dev mode: run without relay servers.
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StakeConfig {
    /// Minimum stake required to register.
    pub min_stake: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Enable the Qdrant-backed semantic index.
    pub enabled: bool,
    pub url: String,
    pub collection: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis address (`host:port`). Empty = in-memory state only.
    pub redis_addr: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            p2p_port: 4001,
            api_port: 8080,
            bootstrap: String::new(),
            dev_mode: true,
        }
    }
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self { min_stake: 10.0 }
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:6333".to_string(),
            collection: "prxs_services".to_string(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LighthouseConfig {
    /// Load config: defaults → file → env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LighthouseConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LIGHTHOUSE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply `LIGHTHOUSE_*` env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LIGHTHOUSE_NETWORK__P2P_PORT") {
            if let Ok(p) = v.parse() {
                self.network.p2p_port = p;
            }
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_NETWORK__BOOTSTRAP") {
            self.network.bootstrap = v;
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_NETWORK__DEV_MODE") {
            self.network.dev_mode = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_STAKE__MIN_STAKE") {
            if let Ok(m) = v.parse() {
                self.stake.min_stake = m;
            }
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_SEMANTIC__ENABLED") {
            self.semantic.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_SEMANTIC__URL") {
            self.semantic.url = v;
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_SEMANTIC__COLLECTION") {
            self.semantic.collection = v;
        }
        if let Ok(v) = std::env::var("LIGHTHOUSE_STORE__REDIS_ADDR") {
            self.store.redis_addr = v;
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lighthouse")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
