// DID Ledger Library Entry Point
//
// Record-management core for decentralized identifiers: a lifecycle registry that maps each
// DID to its off-chain metadata reference, and an append-only ledger of verification attempts.
// Both stores are addressed by hash-derived keys; plaintext history is carried by the
// notifications emitted on every successful mutation.

pub mod core;
pub mod crypto;
pub mod events;
pub mod query;
pub mod types;
pub mod utils;

// Re-export key components for easier access
pub use crate::core::ledger::{VerificationLedger, MAX_BATCH_SIZE};
pub use crate::core::registry::DidRegistry;
pub use crate::core::snapshot::StateSnapshot;
pub use crate::core::IdentityLedger;
pub use crate::events::{EventLog, EventPage, EventSink, LedgerEvent, TracingSink};
pub use crate::query::History;
pub use crate::types::did_types::{
    DidKey, DidRecord, Digest, Principal, RecordKey, Registration,
};
pub use crate::types::error::{LedgerError, Result};
pub use crate::types::verification_types::{BatchEntry, ConfidenceLevel, VerificationRecord};
pub use crate::utils::time::{Clock, ManualClock, SystemClock};

/// Returns the version of the library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
