// Error handling module for the DID ledger node
//
// Wraps ledger failures together with the I/O, configuration and encoding errors that only
// appear once state is persisted to disk.

use std::io;
use std::result;

use did_ledger::LedgerError;
use thiserror::Error;

/// Result type for node operations
pub type Result<T> = result::Result<T, NodeError>;

/// Error type for node operations
#[derive(Debug, Error)]
pub enum NodeError {
    /// Registry or ledger rejected the operation
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization-related errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    IO(String),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl NodeError {
    /// Stable short name, printed by the CLI alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::Ledger(err) => err.kind(),
            NodeError::Config(_) => "config",
            NodeError::Storage(_) => "storage",
            NodeError::Serialization(_) => "serialization",
            NodeError::IO(_) => "io",
            NodeError::Json(_) => "json",
        }
    }
}

impl From<io::Error> for NodeError {
    fn from(err: io::Error) -> Self {
        NodeError::IO(err.to_string())
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::Json(err.to_string())
    }
}

impl From<bincode::Error> for NodeError {
    fn from(err: bincode::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for NodeError {
    fn from(err: toml::ser::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for NodeError {
    fn from(err: toml::de::Error) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for NodeError {
    fn from(err: config::ConfigError) -> Self {
        NodeError::Config(err.to_string())
    }
}
