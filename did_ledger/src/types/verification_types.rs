//! Verification ledger types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::did_types::{DidKey, Digest, Principal};
use crate::types::error::{LedgerError, Result};

/// Ordinal classification of verification certainty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ConfidenceLevel {
    Low = 0,
    Medium = 1,
    High = 2,
    VeryHigh = 3,
}

impl ConfidenceLevel {
    pub const ALL: [ConfidenceLevel; 4] = [
        ConfidenceLevel::Low,
        ConfidenceLevel::Medium,
        ConfidenceLevel::High,
        ConfidenceLevel::VeryHigh,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::VeryHigh => "VERY_HIGH",
        }
    }
}

impl TryFrom<u8> for ConfidenceLevel {
    type Error = LedgerError;

    fn try_from(value: u8) -> Result<Self> {
        ConfidenceLevel::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| {
                LedgerError::invalid_input(format!(
                    "confidence level {value} is out of range 0..=3"
                ))
            })
    }
}

/// Accepts either the level name (`HIGH`, case-insensitive) or its ordinal (`2`)
impl FromStr for ConfidenceLevel {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(ordinal) = s.parse::<u8>() {
            return ConfidenceLevel::try_from(ordinal);
        }
        let upper = s.to_ascii_uppercase();
        ConfidenceLevel::ALL
            .into_iter()
            .find(|level| level.name() == upper)
            .ok_or_else(|| LedgerError::invalid_input(format!("unknown confidence level {s}")))
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One stored verification attempt. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub did_key: DidKey,
    /// Caller-supplied digest of the verification payload
    pub verification_hash: Digest,
    /// Digest of the metadata CID used at verification time
    pub metadata_cid_hash: Digest,
    pub timestamp: u64,
    /// Ordering reference of the call that stored the record
    pub sequence_number: u64,
    pub verifier: Principal,
    pub confidence_level: ConfidenceLevel,
    pub success: bool,
}

/// One entry of a batched verification submission.
///
/// The confidence level is kept as a raw ordinal so that out-of-range values reach the
/// ledger and are skipped there like any other invalid entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub did: String,
    pub verification_hash: Digest,
    #[serde(default)]
    pub metadata_cid: String,
    pub confidence_level: u8,
    pub success: bool,
}

impl BatchEntry {
    pub fn new(
        did: impl Into<String>,
        verification_hash: Digest,
        metadata_cid: impl Into<String>,
        confidence_level: u8,
        success: bool,
    ) -> Self {
        Self {
            did: did.into(),
            verification_hash,
            metadata_cid: metadata_cid.into(),
            confidence_level,
            success,
        }
    }
}
