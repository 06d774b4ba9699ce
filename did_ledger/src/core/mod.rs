//! Record-management core: the DID registry, the verification ledger and the wiring that
//! gives both a shared clock and notification stream.

mod commit;
pub mod ledger;
pub mod registry;
pub mod snapshot;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::commit::CommitLock;
use crate::core::ledger::{LedgerSnapshot, VerificationLedger};
use crate::core::registry::{DidRegistry, RegistrySnapshot};
use crate::core::snapshot::{StateSnapshot, SNAPSHOT_VERSION};
use crate::events::{EventLog, EventSink, FanoutSink, LedgerEvent, TracingSink};
use crate::query::History;
use crate::types::did_types::Principal;
use crate::types::error::{LedgerError, Result};
use crate::utils::time::{Clock, SystemClock};

/// Registry and ledger sharing one clock and one event stream
pub struct IdentityLedger {
    pub registry: Arc<DidRegistry>,
    pub ledger: Arc<VerificationLedger>,
    pub events: Arc<EventLog>,
    clock: Arc<dyn Clock>,
    commit: Arc<CommitLock>,
}

impl IdentityLedger {
    pub fn new(owner: Principal, clock: Arc<dyn Clock>) -> Self {
        let events = Arc::new(EventLog::new());
        let sink = Self::sink(&events);
        let commit = Arc::new(CommitLock::new());
        Self {
            registry: Arc::new(
                DidRegistry::new(owner, clock.clone(), sink.clone())
                    .with_commit_lock(commit.clone()),
            ),
            ledger: Arc::new(
                VerificationLedger::new(clock.clone(), sink).with_commit_lock(commit.clone()),
            ),
            events,
            clock,
            commit,
        }
    }

    /// Rebuild from a snapshot, resuming sequence numbering after its last reference
    pub fn restore(snapshot: StateSnapshot) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::starting_after(snapshot.last_sequence));
        Self::restore_with_clock(snapshot, clock)
    }

    pub fn restore_with_clock(snapshot: StateSnapshot, clock: Arc<dyn Clock>) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::CorruptSnapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let events = Arc::new(EventLog::from_events(snapshot.events));
        if events.last_sequence() > snapshot.last_sequence {
            return Err(LedgerError::CorruptSnapshot(format!(
                "event sequence {} is ahead of recorded sequence {}",
                events.last_sequence(),
                snapshot.last_sequence
            )));
        }

        check_event_coverage(&snapshot.registry, &snapshot.ledger, &events)?;

        let sink = Self::sink(&events);
        let commit = Arc::new(CommitLock::new());
        let registry = DidRegistry::restore(snapshot.registry, clock.clone(), sink.clone())?
            .with_commit_lock(commit.clone());
        let ledger = VerificationLedger::restore(snapshot.ledger, clock.clone(), sink)?
            .with_commit_lock(commit.clone());
        info!(
            "Restored {} DIDs and {} verification records",
            registry.total_dids(),
            ledger.total_verifications()
        );

        Ok(Self {
            registry: Arc::new(registry),
            ledger: Arc::new(ledger),
            events,
            clock,
            commit,
        })
    }

    /// Capture both stores, the event stream and the sequence counter at one commit point.
    ///
    /// Blocks new mutations until the copy is taken and waits for in-flight ones to finish.
    pub fn snapshot(&self) -> StateSnapshot {
        let _commit = self.commit.exclusive();
        StateSnapshot {
            version: SNAPSHOT_VERSION,
            registry: self.registry.snapshot(),
            ledger: self.ledger.snapshot(),
            events: self.events.all(),
            last_sequence: self.clock.last_sequence(),
        }
    }

    /// Read-only view combining both stores and the event stream
    pub fn history(&self) -> History {
        History::new(self.registry.clone(), self.ledger.clone(), self.events.clone())
    }

    fn sink(events: &Arc<EventLog>) -> Arc<dyn EventSink> {
        Arc::new(
            FanoutSink::new()
                .with(events.clone())
                .with(Arc::new(TracingSink)),
        )
    }
}

/// Every stored DID must carry exactly one registration event and every stored record
/// exactly one verification event, and no event may name a key the stores lack.
fn check_event_coverage(
    registry: &RegistrySnapshot,
    ledger: &LedgerSnapshot,
    events: &EventLog,
) -> Result<()> {
    let mut registered = HashSet::new();
    let mut logged = HashSet::new();
    for event in events.all() {
        match event {
            LedgerEvent::DidRegistered { did_key, .. } => {
                if !registered.insert(did_key) {
                    return Err(corrupt(format!("DID {did_key} was registered twice")));
                }
            }
            LedgerEvent::VerificationLogged { record_key, .. } => {
                if !logged.insert(record_key) {
                    return Err(corrupt(format!("record {record_key} was logged twice")));
                }
            }
            _ => {}
        }
    }

    let stored_dids: HashSet<_> = registry.records.iter().map(|(key, _)| *key).collect();
    if stored_dids != registered {
        return Err(corrupt(format!(
            "{} stored DIDs do not match {} registration events",
            stored_dids.len(),
            registered.len()
        )));
    }

    let stored_records: HashSet<_> = ledger.records.iter().map(|(key, _)| *key).collect();
    if stored_records != logged {
        return Err(corrupt(format!(
            "{} stored verification records do not match {} verification events",
            stored_records.len(),
            logged.len()
        )));
    }
    Ok(())
}

fn corrupt(reason: String) -> LedgerError {
    warn!("Rejected snapshot: {}", reason);
    LedgerError::CorruptSnapshot(reason)
}
