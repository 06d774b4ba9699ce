//! Identity key derivation
//!
//! Deterministic derivation of every key the stores are addressed by. The byte layouts
//! below are part of the external contract: any system reproducing keys from the same
//! inputs must hash exactly these bytes.
//!
//! * `did_key    = BLAKE3(utf8(did))`
//! * `cid_hash   = BLAKE3(utf8(cid))`
//! * `record_key = BLAKE3(did_key[32] || verification_hash[32] || timestamp:u64 LE
//!                 || len(caller):u64 LE || utf8(caller) [|| salt:u64 LE])`

use blake3::Hasher;

use crate::types::did_types::{DidKey, Digest, Principal, RecordKey};

/// BLAKE3 digest of arbitrary bytes
pub fn digest(data: &[u8]) -> Digest {
    Digest::new(*blake3::hash(data).as_bytes())
}

/// Lookup key of a DID string
pub fn did_key(did: &str) -> DidKey {
    digest(did.as_bytes())
}

/// Digest of a metadata CID
pub fn cid_hash(cid: &str) -> Digest {
    digest(cid.as_bytes())
}

/// Identity of a verification record.
///
/// `salt` is only present on the batched path, where it carries the ledger's global
/// record counter so that entries sharing every other input still get distinct keys.
pub fn record_key(
    did_key: &DidKey,
    verification_hash: &Digest,
    timestamp: u64,
    caller: &Principal,
    salt: Option<u64>,
) -> RecordKey {
    let caller = caller.as_str().as_bytes();

    let mut hasher = Hasher::new();
    hasher.update(did_key.as_bytes());
    hasher.update(verification_hash.as_bytes());
    hasher.update(&timestamp.to_le_bytes());
    hasher.update(&(caller.len() as u64).to_le_bytes());
    hasher.update(caller);
    if let Some(salt) = salt {
        hasher.update(&salt.to_le_bytes());
    }
    Digest::new(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_did_key_is_deterministic() {
        assert_eq!(did_key("did:example:alice"), did_key("did:example:alice"));
        assert_ne!(did_key("did:example:alice"), did_key("did:example:bob"));
        assert_eq!(
            did_key("did:example:alice"),
            Digest::new(*blake3::hash(b"did:example:alice").as_bytes())
        );
    }

    #[test]
    fn test_record_key_layout() {
        let did = did_key("did:example:alice");
        let hash = Digest::new([9; 32]);
        let caller = Principal::from("verifier-1");

        let mut expected = Vec::new();
        expected.extend_from_slice(did.as_bytes());
        expected.extend_from_slice(hash.as_bytes());
        expected.extend_from_slice(&1_700_000_000u64.to_le_bytes());
        expected.extend_from_slice(&10u64.to_le_bytes());
        expected.extend_from_slice(b"verifier-1");
        assert_eq!(
            record_key(&did, &hash, 1_700_000_000, &caller, None),
            digest(&expected)
        );

        expected.extend_from_slice(&42u64.to_le_bytes());
        assert_eq!(
            record_key(&did, &hash, 1_700_000_000, &caller, Some(42)),
            digest(&expected)
        );
    }

    #[test]
    fn test_record_key_varies_with_every_input() {
        let did = did_key("did:example:alice");
        let hash = Digest::new([9; 32]);
        let caller = Principal::from("verifier-1");
        let base = record_key(&did, &hash, 100, &caller, None);

        assert_ne!(base, record_key(&did_key("did:example:bob"), &hash, 100, &caller, None));
        assert_ne!(base, record_key(&did, &Digest::new([8; 32]), 100, &caller, None));
        assert_ne!(base, record_key(&did, &hash, 101, &caller, None));
        assert_ne!(base, record_key(&did, &hash, 100, &Principal::from("verifier-2"), None));
        assert_ne!(base, record_key(&did, &hash, 100, &caller, Some(0)));
        assert_ne!(
            record_key(&did, &hash, 100, &caller, Some(0)),
            record_key(&did, &hash, 100, &caller, Some(1))
        );
    }
}
