//! # Engine Configuration
//!
//! Serde-backed configuration with YAML file loading. Every field has a
//! default, so a partial config file only overrides what it names.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deployment mode, selects panic-handler verbosity among other things
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Mode {
    /// Development: error responses carry full panic detail
    #[default]
    #[serde(rename = "DEV")]
    Dev,
    /// Production: error responses carry a generic message
    #[serde(rename = "PROD")]
    Prod,
}

/// Data-store connection settings
///
/// The engine only reads `driver` to pick a registered factory; the rest is
/// passed through to the factory untouched.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Registered driver name
    pub driver: String,
    /// Store host
    pub hostname: String,
    /// Store port
    pub port: u16,
    /// Credentials
    pub username: String,
    /// Credentials
    pub password: String,
    /// Connection charset
    pub charset: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            charset: "utf8".to_string(),
        }
    }
}

/// Session cookie and lifetime settings, handed to the session provider
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session id cookie
    pub cookie_name: String,
    /// Length of generated session ids
    pub id_length: usize,
    /// Cookie lifetime in seconds; 0 means a browser-session cookie
    pub cookie_lifetime: u64,
    /// Seconds of inactivity before a session is eligible for destruction
    pub expire_time: u64,
    /// Provider GC sweep interval in seconds
    pub gc_interval: u64,
    /// Cookie domain restriction; empty means none
    pub domain: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "burner-session".to_string(),
            id_length: 10,
            cookie_lifetime: 0,
            expire_time: 3600,
            gc_interval: 60,
            domain: String::new(),
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Deployment mode
    pub mode: Mode,
    /// Listen address for `Engine::run`
    pub listen_addr: String,
    /// Listen port for `Engine::run`
    pub listen_port: u16,
    /// Directory auto-registered for static file serving; empty disables it
    pub public_dir: String,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Data-store settings
    pub store: StoreConfig,
    /// Name of the session provider to resolve from the registry
    pub session_provider: String,
    /// Session settings handed to the provider
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Dev,
            listen_addr: "localhost".to_string(),
            listen_port: 8080,
            public_dir: "public".to_string(),
            max_body_size: 1024 * 1024,
            store: StoreConfig::default(),
            session_provider: "memory".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, filling missing fields with
    /// defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|e| Error::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// The `addr:port` string `Engine::run` listens on
    #[must_use]
    pub fn listen(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}
