//! Cryptographic primitives for the DID ledger.
//!
//! All storage keys are BLAKE3 digests; see [`keys`] for the exact byte layouts.

pub mod keys;

pub use keys::{cid_hash, did_key, digest, record_key};
