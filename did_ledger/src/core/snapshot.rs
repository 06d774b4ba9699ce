//! Whole-state export used for persistence

use serde::{Deserialize, Serialize};

use crate::core::ledger::LedgerSnapshot;
use crate::core::registry::RegistrySnapshot;
use crate::events::LedgerEvent;

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Registry, ledger and notification stream captured together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u32,
    pub registry: RegistrySnapshot,
    pub ledger: LedgerSnapshot,
    /// Notifications in emission order
    pub events: Vec<LedgerEvent>,
    /// Last ordering reference handed out before the snapshot was taken
    pub last_sequence: u64,
}
