//! DID Registry
//!
//! Owns the lifecycle of every DID record: `Nonexistent -> Active <-> Inactive`.
//! Records are stored by derived DID key and are never removed. Each mutation runs under
//! the record's map entry guard, which serializes writers per DID, and under the shared side
//! of the [`CommitLock`]; the notification is emitted before either guard is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::commit::CommitLock;
use crate::crypto::keys;
use crate::events::{EventSink, LedgerEvent};
use crate::types::did_types::{DidKey, DidRecord, Digest, Principal, Registration};
use crate::types::error::{require_non_empty, LedgerError, Result};
use crate::utils::time::Clock;

/// Exportable registry contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub owner: Principal,
    pub records: Vec<(DidKey, DidRecord)>,
}

/// DID lifecycle registry
pub struct DidRegistry {
    /// Registry owner, allowed to mutate any record
    owner: Principal,

    /// Canonical record per DID key
    records: DashMap<DidKey, DidRecord>,

    /// Number of DIDs ever registered
    total: AtomicU64,

    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    commit: Arc<CommitLock>,
}

impl DidRegistry {
    pub fn new(owner: Principal, clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        Self {
            owner,
            records: DashMap::new(),
            total: AtomicU64::new(0),
            clock,
            events,
            commit: Arc::new(CommitLock::new()),
        }
    }

    /// Share a commit barrier with other stores
    pub(crate) fn with_commit_lock(mut self, commit: Arc<CommitLock>) -> Self {
        self.commit = commit;
        self
    }

    /// Rebuild a registry from exported contents
    pub fn restore(
        snapshot: RegistrySnapshot,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let registry = Self::new(snapshot.owner, clock, events);
        for (did_key, record) in snapshot.records {
            if record.registered_at > record.updated_at {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "record {did_key} was updated before it was registered"
                )));
            }
            if registry.records.insert(did_key, record).is_some() {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "duplicate record for DID key {did_key}"
                )));
            }
        }
        registry
            .total
            .store(registry.records.len() as u64, Ordering::SeqCst);
        Ok(registry)
    }

    /// Export every record, ordered by registration time then key
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut records: Vec<(DidKey, DidRecord)> = self
            .records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        records.sort_by(|a, b| (a.1.registered_at, a.0).cmp(&(b.1.registered_at, b.0)));

        RegistrySnapshot {
            owner: self.owner.clone(),
            records,
        }
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    /// Register a new DID and return its key
    pub fn register(
        &self,
        caller: &Principal,
        did: &str,
        metadata_cid: &str,
        identity_hash: Digest,
    ) -> Result<DidKey> {
        require_non_empty("DID", did)?;
        require_non_empty("metadata CID", metadata_cid)?;
        identity_hash.require_non_zero("identity hash")?;

        let did_key = keys::did_key(did);
        let _commit = self.commit.mutation();
        match self.records.entry(did_key) {
            Entry::Occupied(_) => {
                warn!("Rejected duplicate registration of {}", did);
                Err(LedgerError::already_exists("DID", did))
            }
            Entry::Vacant(slot) => {
                let timestamp = self.clock.now();
                let sequence = self.clock.sequence();
                let _guard = slot.insert(DidRecord {
                    metadata_cid: metadata_cid.to_string(),
                    identity_hash,
                    registered_at: timestamp,
                    updated_at: timestamp,
                    registrar: caller.clone(),
                    active: true,
                });
                self.total.fetch_add(1, Ordering::SeqCst);

                self.events.emit(&LedgerEvent::DidRegistered {
                    did_key,
                    did: did.to_string(),
                    metadata_cid: metadata_cid.to_string(),
                    identity_hash,
                    registrar: caller.clone(),
                    timestamp,
                    sequence,
                });
                info!("Registered {} by {}", did, caller);
                Ok(did_key)
            }
        }
    }

    /// Register several DIDs in order, one result per entry.
    ///
    /// Entries are independent: a rejected entry does not stop the ones after it, and a
    /// DID repeated within the list succeeds only the first time.
    pub fn register_many(
        &self,
        caller: &Principal,
        registrations: &[Registration],
    ) -> Vec<Result<DidKey>> {
        let results: Vec<Result<DidKey>> = registrations
            .iter()
            .map(|entry| {
                self.register(caller, &entry.did, &entry.metadata_cid, entry.identity_hash)
            })
            .collect();
        info!(
            "Registered {} of {} DIDs for {}",
            results.iter().filter(|result| result.is_ok()).count(),
            registrations.len(),
            caller
        );
        results
    }

    /// Replace the metadata reference and identity hash of an active DID
    pub fn update(
        &self,
        caller: &Principal,
        did: &str,
        new_metadata_cid: &str,
        new_identity_hash: Digest,
    ) -> Result<()> {
        let did_key = keys::did_key(did);
        let _commit = self.commit.mutation();
        let mut record = self
            .records
            .get_mut(&did_key)
            .ok_or_else(|| LedgerError::not_found("DID", did))?;
        self.authorize(caller, &record, did)?;
        if !record.active {
            return Err(LedgerError::invalid_state(format!(
                "cannot update inactive DID {did}"
            )));
        }
        require_non_empty("metadata CID", new_metadata_cid)?;
        new_identity_hash.require_non_zero("identity hash")?;

        let timestamp = self.clock.now();
        let sequence = self.clock.sequence();
        record.metadata_cid = new_metadata_cid.to_string();
        record.identity_hash = new_identity_hash;
        record.updated_at = timestamp;

        self.events.emit(&LedgerEvent::DidUpdated {
            did_key,
            did: did.to_string(),
            metadata_cid: new_metadata_cid.to_string(),
            identity_hash: new_identity_hash,
            updated_by: caller.clone(),
            timestamp,
            sequence,
        });
        info!("Updated {} by {}", did, caller);
        Ok(())
    }

    /// Flag an active DID inactive. Metadata is left untouched.
    pub fn deactivate(&self, caller: &Principal, did: &str) -> Result<()> {
        self.set_active(caller, did, false)
    }

    /// Flag an inactive DID active again. Metadata is left untouched.
    pub fn reactivate(&self, caller: &Principal, did: &str) -> Result<()> {
        self.set_active(caller, did, true)
    }

    fn set_active(&self, caller: &Principal, did: &str, active: bool) -> Result<()> {
        let did_key = keys::did_key(did);
        let _commit = self.commit.mutation();
        let mut record = self
            .records
            .get_mut(&did_key)
            .ok_or_else(|| LedgerError::not_found("DID", did))?;
        self.authorize(caller, &record, did)?;
        if record.active == active {
            let state = if active { "active" } else { "inactive" };
            return Err(LedgerError::invalid_state(format!(
                "DID {did} is already {state}"
            )));
        }

        let timestamp = self.clock.now();
        let sequence = self.clock.sequence();
        record.active = active;
        record.updated_at = timestamp;

        let event = if active {
            LedgerEvent::DidReactivated {
                did_key,
                did: did.to_string(),
                updated_by: caller.clone(),
                timestamp,
                sequence,
            }
        } else {
            LedgerEvent::DidDeactivated {
                did_key,
                did: did.to_string(),
                updated_by: caller.clone(),
                timestamp,
                sequence,
            }
        };
        self.events.emit(&event);
        info!("{} {} by {}", event.kind(), did, caller);
        Ok(())
    }

    /// Whether `caller` may mutate `record`
    pub fn is_authorized(&self, caller: &Principal, record: &DidRecord) -> bool {
        *caller == record.registrar || *caller == self.owner
    }

    fn authorize(&self, caller: &Principal, record: &DidRecord, did: &str) -> Result<()> {
        if self.is_authorized(caller, record) {
            return Ok(());
        }
        warn!("Rejected mutation of {} by {}", did, caller);
        Err(LedgerError::NotAuthorized(format!(
            "{caller} is neither the registrar of {did} nor the registry owner"
        )))
    }

    /// `(exists, active)` for a DID. Never fails.
    pub fn status(&self, did: &str) -> (bool, bool) {
        match self.records.get(&keys::did_key(did)) {
            Some(record) => (true, record.active),
            None => (false, false),
        }
    }

    pub fn record(&self, did: &str) -> Result<DidRecord> {
        self.record_by_key(&keys::did_key(did))
            .map_err(|_| LedgerError::not_found("DID", did))
    }

    /// Lookup for consumers that only hold the derived key
    pub fn record_by_key(&self, did_key: &DidKey) -> Result<DidRecord> {
        self.records
            .get(did_key)
            .map(|record| record.value().clone())
            .ok_or_else(|| LedgerError::not_found("DID key", did_key))
    }

    pub fn metadata_cid(&self, did: &str) -> Result<String> {
        self.record(did).map(|record| record.metadata_cid)
    }

    /// Current metadata reference of each DID, `None` for unknown ones, in input order
    pub fn metadata_cids<S: AsRef<str>>(&self, dids: &[S]) -> Vec<(String, Option<String>)> {
        dids.iter()
            .map(|did| {
                let did = did.as_ref();
                let cid = self
                    .records
                    .get(&keys::did_key(did))
                    .map(|record| record.metadata_cid.clone());
                (did.to_string(), cid)
            })
            .collect()
    }

    /// True iff the DID is active and both current values match exactly
    pub fn verify(&self, did: &str, metadata_cid: &str, identity_hash: &Digest) -> bool {
        let matched = self
            .records
            .get(&keys::did_key(did))
            .map(|record| {
                record.active
                    && record.metadata_cid == metadata_cid
                    && record.identity_hash == *identity_hash
            })
            .unwrap_or(false);
        debug!("Verification of {} against registry: {}", did, matched);
        matched
    }

    /// Number of DIDs ever registered
    pub fn total_dids(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::utils::time::ManualClock;

    const ALICE: &str = "did:example:alice";

    fn registry() -> (DidRegistry, Arc<EventLog>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let log = Arc::new(EventLog::new());
        let registry = DidRegistry::new(Principal::from("owner"), clock.clone(), log.clone());
        (registry, log, clock)
    }

    #[test]
    fn test_register_rejects_invalid_input() {
        let (registry, log, _) = registry();
        let caller = Principal::from("registrar");
        let hash = Digest::new([1; 32]);

        assert!(matches!(
            registry.register(&caller, "", "cid-1", hash),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.register(&caller, ALICE, "", hash),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.register(&caller, ALICE, "cid-1", Digest::ZERO),
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(registry.total_dids(), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn test_register_sets_timestamps_and_registrar() -> Result<()> {
        let (registry, log, clock) = registry();
        let caller = Principal::from("registrar");
        let did_key = registry.register(&caller, ALICE, "cid-1", Digest::new([1; 32]))?;

        assert_eq!(did_key, keys::did_key(ALICE));
        let record = registry.record_by_key(&did_key)?;
        assert_eq!(record.registered_at, 1_000);
        assert_eq!(record.updated_at, 1_000);
        assert_eq!(record.registrar, caller);
        assert!(record.active);

        clock.advance(10);
        registry.deactivate(&caller, ALICE)?;
        let record = registry.record(ALICE)?;
        assert_eq!(record.registered_at, 1_000);
        assert_eq!(record.updated_at, 1_010);
        assert_eq!(log.len(), 2);
        Ok(())
    }

    #[test]
    fn test_owner_may_mutate_any_record() -> Result<()> {
        let (registry, _, _) = registry();
        registry.register(&Principal::from("registrar"), ALICE, "cid-1", Digest::new([1; 32]))?;

        let owner = Principal::from("owner");
        registry.update(&owner, ALICE, "cid-2", Digest::new([2; 32]))?;
        registry.deactivate(&owner, ALICE)?;
        registry.reactivate(&owner, ALICE)?;
        assert_eq!(registry.metadata_cid(ALICE)?, "cid-2");
        Ok(())
    }

    #[test]
    fn test_update_checks_input_after_state() -> Result<()> {
        let (registry, _, _) = registry();
        let caller = Principal::from("registrar");
        registry.register(&caller, ALICE, "cid-1", Digest::new([1; 32]))?;

        assert!(matches!(
            registry.update(&caller, ALICE, "", Digest::new([2; 32])),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            registry.update(&caller, ALICE, "cid-2", Digest::ZERO),
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(registry.metadata_cid(ALICE)?, "cid-1");
        Ok(())
    }

    #[test]
    fn test_register_many_keeps_per_entry_results() {
        let (registry, log, _) = registry();
        let caller = Principal::from("registrar");
        let entries = vec![
            Registration::new(ALICE, "cid-1", Digest::new([1; 32])),
            Registration::new("", "cid-2", Digest::new([2; 32])),
            Registration::new("did:example:bob", "cid-b", Digest::new([3; 32])),
            Registration::new(ALICE, "cid-3", Digest::new([4; 32])),
        ];

        let results = registry.register_many(&caller, &entries);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0], Ok(keys::did_key(ALICE)));
        assert!(matches!(results[1], Err(LedgerError::InvalidInput(_))));
        assert_eq!(results[2], Ok(keys::did_key("did:example:bob")));
        assert!(matches!(results[3], Err(LedgerError::AlreadyExists(_))));

        assert_eq!(registry.total_dids(), 2);
        assert_eq!(registry.metadata_cid(ALICE).as_deref(), Ok("cid-1"));
        assert_eq!(log.len(), 2);
        assert!(registry.register_many(&caller, &[]).is_empty());
    }

    #[test]
    fn test_metadata_cids_in_input_order() -> Result<()> {
        let (registry, _, _) = registry();
        let caller = Principal::from("registrar");
        registry.register(&caller, ALICE, "cid-a", Digest::new([1; 32]))?;
        registry.register(&caller, "did:example:bob", "cid-b", Digest::new([2; 32]))?;
        registry.deactivate(&caller, "did:example:bob")?;

        let cids = registry.metadata_cids(&["did:example:bob", "did:example:ghost", ALICE]);
        assert_eq!(
            cids,
            vec![
                ("did:example:bob".to_string(), Some("cid-b".to_string())),
                ("did:example:ghost".to_string(), None),
                (ALICE.to_string(), Some("cid-a".to_string())),
            ]
        );
        assert!(registry.metadata_cids::<&str>(&[]).is_empty());
        Ok(())
    }

    #[test]
    fn test_snapshot_restore() -> Result<()> {
        let (registry, _, clock) = registry();
        let caller = Principal::from("registrar");
        registry.register(&caller, ALICE, "cid-1", Digest::new([1; 32]))?;
        clock.advance(1);
        registry.register(&caller, "did:example:bob", "cid-b", Digest::new([3; 32]))?;
        registry.deactivate(&caller, "did:example:bob")?;

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].0, keys::did_key(ALICE));

        let restored = DidRegistry::restore(snapshot.clone(), clock, Arc::new(EventLog::new()))?;
        assert_eq!(restored.total_dids(), 2);
        assert_eq!(restored.status("did:example:bob"), (true, false));
        assert_eq!(restored.snapshot(), snapshot);
        Ok(())
    }

    #[test]
    fn test_restore_rejects_duplicate_keys() {
        let record = DidRecord {
            metadata_cid: "cid".into(),
            identity_hash: Digest::new([1; 32]),
            registered_at: 1,
            updated_at: 1,
            registrar: Principal::from("r"),
            active: true,
        };
        let key = keys::did_key(ALICE);
        let snapshot = RegistrySnapshot {
            owner: Principal::from("owner"),
            records: vec![(key, record.clone()), (key, record)],
        };
        let result = DidRegistry::restore(
            snapshot,
            Arc::new(ManualClock::new(0)),
            Arc::new(EventLog::new()),
        );
        assert!(matches!(result, Err(LedgerError::CorruptSnapshot(_))));
    }
}
