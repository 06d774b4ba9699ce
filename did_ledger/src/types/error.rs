// Error handling module for the DID ledger
//
// Every fallible operation of the registry and the ledger reports one of these variants.
// Single-operation calls leave state untouched when they return an error.

use std::result;
use thiserror::Error;

/// Result type for DID ledger operations
pub type Result<T> = result::Result<T, LedgerError>;

/// Error type for DID ledger operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Empty required string, zero-valued hash or out-of-range enum
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown DID key or record key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate DID key, or duplicate record key on the single-entry path
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Caller is neither the registrar nor the registry owner
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Mutation attempted against a state that disallows it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Batch exceeds the fixed entry limit
    #[error("Batch too large: {size} entries exceeds the limit of {limit}")]
    BatchTooLarge {
        /// Number of entries submitted
        size: usize,
        /// Maximum number of entries accepted
        limit: usize,
    },

    /// A restored snapshot violates a store invariant
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl LedgerError {
    pub fn invalid_input(context: impl Into<String>) -> Self {
        LedgerError::InvalidInput(context.into())
    }

    pub fn not_found(entity: &str, details: impl std::fmt::Display) -> Self {
        LedgerError::NotFound(format!("{entity} {details}"))
    }

    pub fn already_exists(entity: &str, details: impl std::fmt::Display) -> Self {
        LedgerError::AlreadyExists(format!("{entity} {details}"))
    }

    pub fn invalid_state(context: impl Into<String>) -> Self {
        LedgerError::InvalidState(context.into())
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::AlreadyExists(_) => "already_exists",
            LedgerError::NotAuthorized(_) => "not_authorized",
            LedgerError::InvalidState(_) => "invalid_state",
            LedgerError::BatchTooLarge { .. } => "batch_too_large",
            LedgerError::CorruptSnapshot(_) => "corrupt_snapshot",
        }
    }
}

/// Fails with `InvalidInput` when a required string is empty
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LedgerError::invalid_input(format!("{field} cannot be empty")));
    }
    Ok(())
}
