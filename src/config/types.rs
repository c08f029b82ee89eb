//! Configuration types and structures.

use crate::logging::LogLevel;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default port for the webhook listener.
pub const DEFAULT_PORT: u16 = 8080;

/// Default per-call timeout for remote requests, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (default: 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind (default: 8080).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the automation posts to, in addition to `/`.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

/// Outbound REST settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// URL scheme for `<scheme>://<domain>/rest/<method>` (default: https).
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Per-call timeout in seconds (default: 30). No retries are made.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Skip TLS certificate verification (default: true, portals often run
    /// behind self-signed certificates).
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_accept_invalid_certs() -> bool {
    true
}

/// Diagnostic log configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Append-only diagnostic log file. Disabled when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Minimum level recorded (default: debug).
    #[serde(default)]
    pub level: LogLevel,
}
