//! Read/query surface
//!
//! Reconstructs a DID's history from the registry, the ledger and the notification stream.
//! Nothing here mutates state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::ledger::VerificationLedger;
use crate::core::registry::DidRegistry;
use crate::crypto::keys;
use crate::events::{EventLog, LedgerEvent};
use crate::types::error::Result;

/// Aggregate verification outcome for one DID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationStats {
    pub did: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Fraction of successful attempts, 0.0 when there are none
    pub success_rate: f64,
}

/// Totals across all DIDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub total_dids: u64,
    pub total_verifications: u64,
    pub total_events: usize,
}

#[derive(Clone)]
pub struct History {
    registry: Arc<DidRegistry>,
    ledger: Arc<VerificationLedger>,
    events: Arc<EventLog>,
}

impl History {
    pub fn new(
        registry: Arc<DidRegistry>,
        ledger: Arc<VerificationLedger>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            registry,
            ledger,
            events,
        }
    }

    /// Every lifecycle and verification event of a registered DID, oldest first.
    ///
    /// Ordered by `(timestamp, sequence)`; events sharing both keep emission order.
    pub fn timeline(&self, did: &str) -> Result<Vec<LedgerEvent>> {
        self.registry.record(did)?;

        let mut timeline = self.events.events_for(&keys::did_key(did));
        timeline.sort_by_key(|event| (event.timestamp(), event.sequence()));
        Ok(timeline)
    }

    pub fn verification_stats(&self, did: &str) -> Result<VerificationStats> {
        self.registry.record(did)?;

        let records = self.ledger.records_for(did);
        let total = records.len();
        let successful = records.iter().filter(|record| record.success).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };

        Ok(VerificationStats {
            did: did.to_string(),
            total,
            successful,
            failed: total - successful,
            success_rate,
        })
    }

    pub fn overview(&self) -> Overview {
        Overview {
            total_dids: self.registry.total_dids(),
            total_verifications: self.ledger.total_verifications(),
            total_events: self.events.len(),
        }
    }
}
