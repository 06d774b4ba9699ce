//! Verification Ledger
//!
//! Append-only store of verification attempts. Records are keyed by a derived record key and
//! indexed per DID in insertion order. All ledger state sits behind a single lock: every
//! mutation, including a whole batch, holds the write guard, which serializes the global
//! counter that doubles as the batch uniqueness salt. Mutations also hold the shared side of
//! the [`CommitLock`] until their notifications are out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::commit::CommitLock;
use crate::crypto::keys;
use crate::events::{EventSink, LedgerEvent};
use crate::types::did_types::{DidKey, Digest, Principal, RecordKey};
use crate::types::error::{require_non_empty, LedgerError, Result};
use crate::types::verification_types::{BatchEntry, ConfidenceLevel, VerificationRecord};
use crate::utils::time::Clock;

/// Maximum number of entries accepted by [`VerificationLedger::log_batch`]
pub const MAX_BATCH_SIZE: usize = 50;

/// Exportable ledger contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Global record counter
    pub total: u64,
    /// Records in global insertion order
    pub records: Vec<(RecordKey, VerificationRecord)>,
}

/// Records plus the per-DID index. Both change together through [`LedgerState::append`].
#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<RecordKey, VerificationRecord>,
    index: HashMap<DidKey, Vec<RecordKey>>,
    /// Record keys in global insertion order
    order: Vec<RecordKey>,
    total: u64,
}

impl LedgerState {
    fn contains(&self, record_key: &RecordKey) -> bool {
        self.records.contains_key(record_key)
    }

    fn append(&mut self, record_key: RecordKey, record: VerificationRecord) {
        self.index.entry(record.did_key).or_default().push(record_key);
        self.order.push(record_key);
        self.records.insert(record_key, record);
        self.total += 1;
    }

    fn keys_for(&self, did_key: &DidKey) -> &[RecordKey] {
        self.index.get(did_key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Append-only verification ledger
pub struct VerificationLedger {
    state: RwLock<LedgerState>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    commit: Arc<CommitLock>,
}

/// Validation shared by the single and the batched path
fn validate_entry(
    did: &str,
    verification_hash: &Digest,
    confidence_level: u8,
) -> Result<ConfidenceLevel> {
    require_non_empty("DID", did)?;
    verification_hash.require_non_zero("verification hash")?;
    ConfidenceLevel::try_from(confidence_level)
}

impl VerificationLedger {
    pub fn new(clock: Arc<dyn Clock>, events: Arc<dyn EventSink>) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
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

    /// Rebuild a ledger from exported contents.
    ///
    /// The per-DID index is regenerated from the global insertion order, so it always
    /// lists exactly the stored keys.
    pub fn restore(
        snapshot: LedgerSnapshot,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        if snapshot.total != snapshot.records.len() as u64 {
            return Err(LedgerError::CorruptSnapshot(format!(
                "counter {} does not match {} stored records",
                snapshot.total,
                snapshot.records.len()
            )));
        }

        let mut state = LedgerState::default();
        for (record_key, record) in snapshot.records {
            if state.contains(&record_key) {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "duplicate record key {record_key}"
                )));
            }
            state.append(record_key, record);
        }

        Ok(Self {
            state: RwLock::new(state),
            clock,
            events,
            commit: Arc::new(CommitLock::new()),
        })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read();
        let records = state
            .order
            .iter()
            .filter_map(|key| state.records.get(key).map(|record| (*key, record.clone())))
            .collect();
        LedgerSnapshot {
            total: state.total,
            records,
        }
    }

    /// Store one verification attempt with all-or-nothing semantics
    pub fn log(
        &self,
        caller: &Principal,
        did: &str,
        verification_hash: Digest,
        metadata_cid: &str,
        confidence_level: u8,
        success: bool,
    ) -> Result<RecordKey> {
        let confidence_level = validate_entry(did, &verification_hash, confidence_level)?;
        let did_key = keys::did_key(did);

        let _commit = self.commit.mutation();
        let mut state = self.state.write();
        let timestamp = self.clock.now();
        let record_key = keys::record_key(&did_key, &verification_hash, timestamp, caller, None);
        if state.contains(&record_key) {
            warn!("Rejected duplicate verification record {} for {}", record_key, did);
            return Err(LedgerError::already_exists("verification record", record_key));
        }

        let sequence = self.clock.sequence();
        state.append(
            record_key,
            VerificationRecord {
                did_key,
                verification_hash,
                metadata_cid_hash: keys::cid_hash(metadata_cid),
                timestamp,
                sequence_number: sequence,
                verifier: caller.clone(),
                confidence_level,
                success,
            },
        );

        self.events.emit(&LedgerEvent::VerificationLogged {
            did_key,
            did: did.to_string(),
            record_key,
            verification_hash,
            metadata_cid: metadata_cid.to_string(),
            confidence_level,
            success,
            verifier: caller.clone(),
            timestamp,
            sequence,
        });
        info!("Logged verification {} for {}", record_key, did);
        Ok(record_key)
    }

    /// Store up to [`MAX_BATCH_SIZE`] verification attempts, returning how many were stored.
    ///
    /// Invalid entries and entries whose key already exists are skipped without an error.
    /// Entries are processed in order; each stored entry advances the global counter that
    /// salts the next entry's key.
    pub fn log_batch(&self, caller: &Principal, entries: &[BatchEntry]) -> Result<usize> {
        if entries.len() > MAX_BATCH_SIZE {
            warn!(
                "Rejected verification batch of {} entries from {}",
                entries.len(),
                caller
            );
            return Err(LedgerError::BatchTooLarge {
                size: entries.len(),
                limit: MAX_BATCH_SIZE,
            });
        }

        let _commit = self.commit.mutation();
        let mut state = self.state.write();
        let timestamp = self.clock.now();
        let sequence = self.clock.sequence();
        let mut stored = 0;

        for (position, entry) in entries.iter().enumerate() {
            let confidence_level =
                match validate_entry(&entry.did, &entry.verification_hash, entry.confidence_level) {
                    Ok(level) => level,
                    Err(e) => {
                        debug!("Skipping batch entry {}: {}", position, e);
                        continue;
                    }
                };

            let did_key = keys::did_key(&entry.did);
            let record_key = keys::record_key(
                &did_key,
                &entry.verification_hash,
                timestamp,
                caller,
                Some(state.total),
            );
            // The salt never repeats within one ledger, so this only fires against restored
            // records that already hold the key for the current counter value.
            if state.contains(&record_key) {
                debug!("Skipping batch entry {}: record {} exists", position, record_key);
                continue;
            }

            state.append(
                record_key,
                VerificationRecord {
                    did_key,
                    verification_hash: entry.verification_hash,
                    metadata_cid_hash: keys::cid_hash(&entry.metadata_cid),
                    timestamp,
                    sequence_number: sequence,
                    verifier: caller.clone(),
                    confidence_level,
                    success: entry.success,
                },
            );
            stored += 1;

            self.events.emit(&LedgerEvent::VerificationLogged {
                did_key,
                did: entry.did.clone(),
                record_key,
                verification_hash: entry.verification_hash,
                metadata_cid: entry.metadata_cid.clone(),
                confidence_level,
                success: entry.success,
                verifier: caller.clone(),
                timestamp,
                sequence,
            });
        }

        self.events.emit(&LedgerEvent::BatchLogged {
            verifier: caller.clone(),
            submitted: entries.len(),
            stored,
            timestamp,
            sequence,
        });
        info!(
            "Logged verification batch from {}: {} of {} entries stored",
            caller,
            stored,
            entries.len()
        );
        Ok(stored)
    }

    /// Number of records stored for a DID
    pub fn count(&self, did: &str) -> usize {
        self.state.read().keys_for(&keys::did_key(did)).len()
    }

    /// Record keys of a DID in insertion (chronological) order
    pub fn record_keys_for(&self, did: &str) -> Vec<RecordKey> {
        self.state.read().keys_for(&keys::did_key(did)).to_vec()
    }

    pub fn get(&self, record_key: &RecordKey) -> Result<VerificationRecord> {
        self.state
            .read()
            .records
            .get(record_key)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("verification record", record_key))
    }

    /// Up to `limit` records of a DID, most recent first
    pub fn recent(&self, did: &str, limit: usize) -> Vec<VerificationRecord> {
        let state = self.state.read();
        state
            .keys_for(&keys::did_key(did))
            .iter()
            .rev()
            .take(limit)
            .filter_map(|key| state.records.get(key).cloned())
            .collect()
    }

    /// All records of a DID in insertion order
    pub fn records_for(&self, did: &str) -> Vec<VerificationRecord> {
        let state = self.state.read();
        state
            .keys_for(&keys::did_key(did))
            .iter()
            .filter_map(|key| state.records.get(key).cloned())
            .collect()
    }

    /// True iff the record exists and belongs to `did` with `verification_hash`. Never fails.
    pub fn verify(&self, record_key: &RecordKey, did: &str, verification_hash: &Digest) -> bool {
        self.state
            .read()
            .records
            .get(record_key)
            .map(|record| {
                record.did_key == keys::did_key(did)
                    && record.verification_hash == *verification_hash
            })
            .unwrap_or(false)
    }

    /// Number of records ever stored
    pub fn total_verifications(&self) -> u64 {
        self.state.read().total
    }
}
