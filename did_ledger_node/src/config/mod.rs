// Configuration module for the DID ledger node
//
// Settings come from a TOML file layered under `DID_LEDGER__<SECTION>__<KEY>` environment
// variables. Every field has a default, so a missing file yields a usable configuration.

use std::fs;
use std::path::{Path, PathBuf};

use config::{Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DID_LEDGER";

/// Node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity the node acts as
    pub node: IdentityConfig,
    /// Snapshot persistence
    pub storage: StorageConfig,
    /// Query defaults
    pub ledger: LedgerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Principals used by the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Caller identity attached to every mutation
    pub principal: String,
    /// Registry owner written into a fresh snapshot; defaults to `principal`
    pub owner: Option<String>,
}

/// Snapshot persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot file; a `.json` extension selects JSON, anything else bincode
    pub snapshot_path: PathBuf,
    /// Write the snapshot back after every successful mutation
    pub autosave: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Number of records `recent` returns when no limit is given
    pub recent_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            principal: "node".to_string(),
            owner: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/did_ledger.snapshot"),
            autosave: true,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { recent_limit: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl IdentityConfig {
    pub fn owner(&self) -> &str {
        self.owner.as_deref().unwrap_or(&self.principal)
    }
}

impl NodeConfig {
    /// Load configuration from an optional file plus environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: NodeConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, ignoring the environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: NodeConfig = toml::from_str(&config_str)
            .map_err(|e| NodeError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        fs::write(path, config_str)
            .map_err(|e| NodeError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.principal.trim().is_empty() {
            return Err(NodeError::Config("node.principal must not be empty".into()));
        }
        if self.node.owner().trim().is_empty() {
            return Err(NodeError::Config("node.owner must not be empty".into()));
        }
        if self.ledger.recent_limit == 0 {
            return Err(NodeError::Config(
                "ledger.recent_limit must be at least 1".into(),
            ));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(NodeError::Config(format!(
                "unknown log format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

/// Write a default configuration file at the given path if it doesn't exist
pub fn ensure_default_config<P: AsRef<Path>>(path: P) -> Result<NodeConfig> {
    let path = path.as_ref();
    if path.exists() {
        return NodeConfig::load(path);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let config = NodeConfig::default();
    config.to_file(path)?;
    Ok(config)
}
