//! DID registry types
//!
//! Fixed-size digests, caller principals and the canonical per-DID record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::error::{LedgerError, Result};

/// Size in bytes of every digest handled by the ledger
pub const DIGEST_LEN: usize = 32;

/// A 32-byte digest.
///
/// Used for derived storage keys as well as for the opaque identity and verification
/// hashes supplied by callers. Human-readable encodings (JSON, TOML) carry it as a
/// 64-character lowercase hex string; binary encodings carry the raw bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

/// Derived lookup key of a DID string
pub type DidKey = Digest;

/// Derived identity of one verification record
pub type RecordKey = Digest;

impl Digest {
    /// The all-zero digest, rejected wherever a caller-supplied hash is required
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string, with or without a `0x` prefix
    pub fn from_hex(value: &str) -> Result<Self> {
        let trimmed = value.strip_prefix("0x").unwrap_or(value);
        let bytes = hex::decode(trimmed)
            .map_err(|e| LedgerError::invalid_input(format!("invalid hex digest: {e}")))?;
        let bytes: [u8; DIGEST_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            LedgerError::invalid_input(format!(
                "digest must be {DIGEST_LEN} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Digest(bytes))
    }

    /// Fails with `InvalidInput` when the digest is zero
    pub(crate) fn require_non_zero(&self, field: &str) -> Result<()> {
        if self.is_zero() {
            return Err(LedgerError::invalid_input(format!("{field} cannot be zero")));
        }
        Ok(())
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }
}

impl FromStr for Digest {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::from_hex(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            Digest::from_hex(&encoded).map_err(serde::de::Error::custom)
        } else {
            <[u8; DIGEST_LEN]>::deserialize(deserializer).map(Digest)
        }
    }
}

/// Stable identifier of the caller of an operation.
///
/// Provisioning and authentication of principals happen outside the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Principal(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Principal(id.to_string())
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Principal(id)
    }
}

/// Canonical registry record, exactly one per DID key.
///
/// Records are never deleted; deactivation only clears `active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidRecord {
    /// Reference to the externally stored metadata
    pub metadata_cid: String,
    /// Digest of the registration payload
    pub identity_hash: Digest,
    /// Timestamp of registration
    pub registered_at: u64,
    /// Timestamp of the last mutation
    pub updated_at: u64,
    /// Principal that created the record
    pub registrar: Principal,
    /// Lifecycle flag
    pub active: bool,
}

/// One entry of a bulk registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub did: String,
    pub metadata_cid: String,
    pub identity_hash: Digest,
}

impl Registration {
    pub fn new(
        did: impl Into<String>,
        metadata_cid: impl Into<String>,
        identity_hash: Digest,
    ) -> Self {
        Self {
            did: did.into(),
            metadata_cid: metadata_cid.into(),
            identity_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_parsing() -> Result<()> {
        let digest = Digest::new([0xab; DIGEST_LEN]);
        assert_eq!(Digest::from_hex(&digest.to_hex())?, digest);
        assert_eq!(Digest::from_hex(&format!("0x{}", digest.to_hex()))?, digest);
        assert_eq!(digest.to_string(), format!("0x{}", "ab".repeat(32)));

        assert!(matches!(
            Digest::from_hex("abcd"),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            Digest::from_hex("zz"),
            Err(LedgerError::InvalidInput(_))
        ));
        Ok(())
    }

    #[test]
    fn test_zero_digest() {
        assert!(Digest::ZERO.is_zero());
        assert!(Digest::default().is_zero());
        assert!(!Digest::new([1; DIGEST_LEN]).is_zero());
        assert!(Digest::ZERO.require_non_zero("identity hash").is_err());
    }

    #[test]
    fn test_digest_serde_encodings() {
        let digest = Digest::new([7; DIGEST_LEN]);

        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);

        let bytes = bincode::serialize(&digest).unwrap();
        assert_eq!(bytes.len(), DIGEST_LEN);
        let back: Digest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_principal_is_transparent() {
        let principal = Principal::from("0xRegistrar");
        assert_eq!(serde_json::to_string(&principal).unwrap(), "\"0xRegistrar\"");
        assert_eq!(principal.as_str(), "0xRegistrar");
    }
}
