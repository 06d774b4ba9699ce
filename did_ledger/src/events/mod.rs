//! Notifications emitted by the registry and the ledger.
//!
//! Storage keys are one-way hashes, so these events are the only place the plaintext DID,
//! CID and score fields survive. Every successful mutation emits exactly one event per
//! stored fact, while the mutation's lock is still held, so the order in which a sink
//! receives events is the commit order.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::did_types::{DidKey, Digest, Principal, RecordKey};
use crate::types::verification_types::ConfidenceLevel;

/// A notification describing one committed mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    DidRegistered {
        did_key: DidKey,
        did: String,
        metadata_cid: String,
        identity_hash: Digest,
        registrar: Principal,
        timestamp: u64,
        sequence: u64,
    },
    DidUpdated {
        did_key: DidKey,
        did: String,
        metadata_cid: String,
        identity_hash: Digest,
        updated_by: Principal,
        timestamp: u64,
        sequence: u64,
    },
    DidDeactivated {
        did_key: DidKey,
        did: String,
        updated_by: Principal,
        timestamp: u64,
        sequence: u64,
    },
    DidReactivated {
        did_key: DidKey,
        did: String,
        updated_by: Principal,
        timestamp: u64,
        sequence: u64,
    },
    VerificationLogged {
        did_key: DidKey,
        did: String,
        record_key: RecordKey,
        verification_hash: Digest,
        metadata_cid: String,
        confidence_level: ConfidenceLevel,
        success: bool,
        verifier: Principal,
        timestamp: u64,
        sequence: u64,
    },
    /// Aggregate emitted once per batch, after the per-entry events
    BatchLogged {
        verifier: Principal,
        submitted: usize,
        stored: usize,
        timestamp: u64,
        sequence: u64,
    },
}

impl LedgerEvent {
    /// DID key the event belongs to; `None` for aggregate events
    pub fn did_key(&self) -> Option<&DidKey> {
        match self {
            LedgerEvent::DidRegistered { did_key, .. }
            | LedgerEvent::DidUpdated { did_key, .. }
            | LedgerEvent::DidDeactivated { did_key, .. }
            | LedgerEvent::DidReactivated { did_key, .. }
            | LedgerEvent::VerificationLogged { did_key, .. } => Some(did_key),
            LedgerEvent::BatchLogged { .. } => None,
        }
    }

    pub fn did(&self) -> Option<&str> {
        match self {
            LedgerEvent::DidRegistered { did, .. }
            | LedgerEvent::DidUpdated { did, .. }
            | LedgerEvent::DidDeactivated { did, .. }
            | LedgerEvent::DidReactivated { did, .. }
            | LedgerEvent::VerificationLogged { did, .. } => Some(did),
            LedgerEvent::BatchLogged { .. } => None,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            LedgerEvent::DidRegistered { timestamp, .. }
            | LedgerEvent::DidUpdated { timestamp, .. }
            | LedgerEvent::DidDeactivated { timestamp, .. }
            | LedgerEvent::DidReactivated { timestamp, .. }
            | LedgerEvent::VerificationLogged { timestamp, .. }
            | LedgerEvent::BatchLogged { timestamp, .. } => *timestamp,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            LedgerEvent::DidRegistered { sequence, .. }
            | LedgerEvent::DidUpdated { sequence, .. }
            | LedgerEvent::DidDeactivated { sequence, .. }
            | LedgerEvent::DidReactivated { sequence, .. }
            | LedgerEvent::VerificationLogged { sequence, .. }
            | LedgerEvent::BatchLogged { sequence, .. } => *sequence,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::DidRegistered { .. } => "registration",
            LedgerEvent::DidUpdated { .. } => "update",
            LedgerEvent::DidDeactivated { .. } => "deactivation",
            LedgerEvent::DidReactivated { .. } => "reactivation",
            LedgerEvent::VerificationLogged { .. } => "verification",
            LedgerEvent::BatchLogged { .. } => "batch",
        }
    }
}

/// Receiver of ledger notifications
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LedgerEvent);
}

/// Append-only in-memory event stream, queryable per DID
#[derive(Debug, Default)]
pub struct EventLog {
    entries: RwLock<Vec<LedgerEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from previously exported events, preserving their order
    pub fn from_events(events: Vec<LedgerEvent>) -> Self {
        Self {
            entries: RwLock::new(events),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All events in emission order
    pub fn all(&self) -> Vec<LedgerEvent> {
        self.entries.read().clone()
    }

    /// Events of one DID in emission order
    pub fn events_for(&self, did_key: &DidKey) -> Vec<LedgerEvent> {
        self.filtered(|event| event.did_key() == Some(did_key))
    }

    /// Registrations of one DID, or of every DID when `did_key` is `None`
    pub fn registration_events(&self, did_key: Option<&DidKey>) -> Vec<LedgerEvent> {
        self.filtered(|event| {
            matches!(event, LedgerEvent::DidRegistered { .. }) && concerns(event, did_key)
        })
    }

    /// Verifications of one DID, or of every DID when `did_key` is `None`
    pub fn verification_events(&self, did_key: Option<&DidKey>) -> Vec<LedgerEvent> {
        self.filtered(|event| {
            matches!(event, LedgerEvent::VerificationLogged { .. }) && concerns(event, did_key)
        })
    }

    /// Events with a sequence reference of at least `from_sequence`, in emission order.
    ///
    /// With a DID key only that DID's events are returned, which leaves out batch aggregates.
    pub fn events_since(&self, from_sequence: u64, did_key: Option<&DidKey>) -> Vec<LedgerEvent> {
        self.filtered(|event| event.sequence() >= from_sequence && concerns(event, did_key))
    }

    /// One page of [`EventLog::events_since`].
    ///
    /// The log only grows at its tail, so an offset taken from `next_offset` stays valid
    /// across appends made between two calls.
    pub fn events_page(
        &self,
        from_sequence: u64,
        did_key: Option<&DidKey>,
        offset: usize,
        limit: usize,
    ) -> EventPage {
        let matching = self.events_since(from_sequence, did_key);
        let total = matching.len();
        let events: Vec<LedgerEvent> = matching.into_iter().skip(offset).take(limit).collect();
        let end = offset.saturating_add(events.len());
        EventPage {
            next_offset: (end < total && !events.is_empty()).then_some(end),
            events,
            total,
        }
    }

    /// Highest sequence reference seen so far
    pub fn last_sequence(&self) -> u64 {
        self.entries
            .read()
            .iter()
            .map(LedgerEvent::sequence)
            .max()
            .unwrap_or(0)
    }

    fn filtered(&self, predicate: impl Fn(&LedgerEvent) -> bool) -> Vec<LedgerEvent> {
        self.entries
            .read()
            .iter()
            .filter(|event| predicate(event))
            .cloned()
            .collect()
    }
}

fn concerns(event: &LedgerEvent, did_key: Option<&DidKey>) -> bool {
    did_key.map_or(true, |key| event.did_key() == Some(key))
}

/// A bounded slice of the event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<LedgerEvent>,
    /// Number of events matching the query, across all pages
    pub total: usize,
    /// Offset of the next page, `None` on the last one
    pub next_offset: Option<usize>,
}

impl EventSink for EventLog {
    fn emit(&self, event: &LedgerEvent) {
        self.entries.write().push(event.clone());
    }
}

/// Writes every notification as a structured tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::VerificationLogged {
                did,
                record_key,
                confidence_level,
                success,
                verifier,
                sequence,
                ..
            } => info!(
                target: "did_ledger::events",
                kind = event.kind(),
                did = %did,
                record_key = %record_key,
                confidence = %confidence_level,
                success = *success,
                verifier = %verifier,
                sequence = *sequence,
                "verification logged"
            ),
            LedgerEvent::BatchLogged {
                verifier,
                submitted,
                stored,
                sequence,
                ..
            } => info!(
                target: "did_ledger::events",
                kind = event.kind(),
                verifier = %verifier,
                submitted = *submitted,
                stored = *stored,
                sequence = *sequence,
                "verification batch logged"
            ),
            other => info!(
                target: "did_ledger::events",
                kind = other.kind(),
                did = other.did().unwrap_or_default(),
                sequence = other.sequence(),
                "did lifecycle event"
            ),
        }
    }
}

/// Forwards each event to several sinks in order
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &LedgerEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::did_key;

    fn deactivated(did: &str, sequence: u64) -> LedgerEvent {
        LedgerEvent::DidDeactivated {
            did_key: did_key(did),
            did: did.to_string(),
            updated_by: Principal::from("owner"),
            timestamp: 100,
            sequence,
        }
    }

    #[test]
    fn test_event_log_filters_by_did() {
        let log = EventLog::new();
        log.emit(&deactivated("did:example:alice", 1));
        log.emit(&deactivated("did:example:bob", 2));
        log.emit(&LedgerEvent::BatchLogged {
            verifier: Principal::from("v"),
            submitted: 0,
            stored: 0,
            timestamp: 100,
            sequence: 3,
        });

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_for(&did_key("did:example:alice")).len(), 1);
        assert!(log.registration_events(Some(&did_key("did:example:alice"))).is_empty());
        assert!(log.verification_events(None).is_empty());
        assert_eq!(log.last_sequence(), 3);
    }

    fn registered(did: &str, sequence: u64) -> LedgerEvent {
        LedgerEvent::DidRegistered {
            did_key: did_key(did),
            did: did.to_string(),
            metadata_cid: "cid".to_string(),
            identity_hash: Digest::new([1; 32]),
            registrar: Principal::from("registrar"),
            timestamp: 100,
            sequence,
        }
    }

    #[test]
    fn test_registration_events_span_all_dids_without_filter() {
        let log = EventLog::new();
        log.emit(&registered("did:example:alice", 1));
        log.emit(&deactivated("did:example:alice", 2));
        log.emit(&registered("did:example:bob", 3));

        assert_eq!(log.registration_events(None).len(), 2);
        let bob = log.registration_events(Some(&did_key("did:example:bob")));
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].sequence(), 3);
    }

    #[test]
    fn test_events_since_applies_sequence_and_did() {
        let log = EventLog::new();
        log.emit(&registered("did:example:alice", 1));
        log.emit(&registered("did:example:bob", 2));
        log.emit(&deactivated("did:example:alice", 3));
        log.emit(&LedgerEvent::BatchLogged {
            verifier: Principal::from("v"),
            submitted: 1,
            stored: 1,
            timestamp: 100,
            sequence: 4,
        });

        let since: Vec<u64> = log.events_since(2, None).iter().map(LedgerEvent::sequence).collect();
        assert_eq!(since, vec![2, 3, 4]);

        let alice = did_key("did:example:alice");
        let alice_since: Vec<u64> = log
            .events_since(2, Some(&alice))
            .iter()
            .map(LedgerEvent::sequence)
            .collect();
        assert_eq!(alice_since, vec![3]);
        assert!(log.events_since(5, None).is_empty());
    }

    #[test]
    fn test_events_page_walks_to_the_end() {
        let log = EventLog::new();
        for sequence in 1..=5 {
            log.emit(&deactivated("did:example:alice", sequence));
        }

        let first = log.events_page(0, None, 0, 2);
        assert_eq!(first.total, 5);
        assert_eq!(first.events.len(), 2);
        assert_eq!(first.next_offset, Some(2));

        let last = log.events_page(0, None, 4, 2);
        assert_eq!(last.events.len(), 1);
        assert_eq!(last.events[0].sequence(), 5);
        assert_eq!(last.next_offset, None);

        let beyond = log.events_page(0, None, 9, 2);
        assert!(beyond.events.is_empty());
        assert_eq!(beyond.next_offset, None);

        let empty_limit = log.events_page(0, None, 0, 0);
        assert!(empty_limit.events.is_empty());
        assert_eq!(empty_limit.next_offset, None);
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(EventLog::new());
        let second = Arc::new(EventLog::new());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingSink));

        fanout.emit(&deactivated("did:example:alice", 1));
        assert_eq!(first.len(), 1);
        assert_eq!(second.all(), first.all());
    }

    #[test]
    fn test_event_json_is_keyed_by_kind() {
        let json = serde_json::to_value(deactivated("did:example:alice", 7)).unwrap();
        assert_eq!(json["did_deactivated"]["did"], "did:example:alice");
        assert_eq!(json["did_deactivated"]["sequence"], 7);
    }

    #[test]
    fn test_event_survives_bincode() {
        let event = deactivated("did:example:alice", 7);
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: LedgerEvent = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, event);
    }
}
