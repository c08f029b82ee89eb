//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: TASK_BRIDGE_USER_DIR or ~/.task-bridge
        let user_dir = std::env::var("TASK_BRIDGE_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".task-bridge")));

        // Project dir: TASK_BRIDGE_PROJECT_DIR or $CWD/task-bridge
        let project_dir = std::env::var("TASK_BRIDGE_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("task-bridge")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority config file that was read, if any.
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        // Explicit config path overrides the file tiers
        if let Ok(explicit_path) = std::env::var("TASK_BRIDGE_CONFIG_PATH") {
            let path = PathBuf::from(&explicit_path);
            let mut config = Config::load(&path)?;
            Self::apply_env_overrides(&mut config);
            return Ok(Self {
                paths,
                config,
                config_path: Some(path),
            });
        }

        let mut configs: Vec<Value> = Vec::new();
        let mut config_path = None;

        // Tier 1: Defaults
        configs.push(serde_json::to_value(Config::default())?);

        // Tiers 2 and 3: project, then user
        for dir in [paths.project_dir.as_deref(), paths.user_dir.as_deref()]
            .into_iter()
            .flatten()
        {
            if let Some(value) = read_yaml(&dir.join("config.yaml")) {
                configs.push(value);
                config_path = Some(dir.join("config.yaml"));
            }
        }

        let merged = deep_merge_all(configs);
        let mut config: Config = serde_json::from_value(merged)?;

        // Tier 4: Environment variable overrides
        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(host) = std::env::var("TASK_BRIDGE_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("TASK_BRIDGE_PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!("Ignoring invalid TASK_BRIDGE_PORT: {}", port),
            }
        }

        if let Ok(timeout) = std::env::var("TASK_BRIDGE_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(timeout) => config.remote.timeout_secs = timeout,
                Err(_) => warn!("Ignoring invalid TASK_BRIDGE_TIMEOUT_SECS: {}", timeout),
            }
        }

        if let Ok(path) = std::env::var("TASK_BRIDGE_DIAGNOSTIC_LOG") {
            config.diagnostics.file = Some(PathBuf::from(path));
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Get the config file path that was used.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Read a YAML file as JSON. Missing or unparsable files are skipped.
fn read_yaml(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(path).ok()?;
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Skipping unparsable config {}: {}", path.display(), e);
            None
        }
    }
}
