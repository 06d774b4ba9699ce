//! Time and ordering sources for the ledger.
//!
//! Every mutation stamps its records and notifications with a timestamp and a sequence
//! reference taken from a [`Clock`]. Injecting the clock keeps key derivation reproducible
//! in tests and lets a deployment choose its own timestamp granularity.
//!
//! # Example
//!
//!  ```rust
//! use did_ledger::utils::time::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(1_700_000_000);
//! assert_eq!(clock.now(), 1_700_000_000);
//! clock.advance(5);
//! assert_eq!(clock.now(), 1_700_000_005);
//! assert_eq!(clock.sequence(), 1);
//! assert_eq!(clock.sequence(), 2);
//!  ```
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current timestamp in seconds since the epoch.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Source of timestamps and ordering references
pub trait Clock: Send + Sync {
    /// Current timestamp in seconds
    fn now(&self) -> u64;

    /// Next ordering reference. Strictly increasing across calls.
    fn sequence(&self) -> u64;

    /// Last ordering reference handed out, 0 if none
    fn last_sequence(&self) -> u64;
}

/// Wall clock with an in-process sequence counter
#[derive(Debug, Default)]
pub struct SystemClock {
    sequence: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume numbering after `last_sequence`, used when restoring persisted state
    pub fn starting_after(last_sequence: u64) -> Self {
        Self {
            sequence: AtomicU64::new(last_sequence),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        now()
    }

    fn sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

/// Manually driven clock for tests and deterministic replays
#[derive(Debug, Default)]
pub struct ManualClock {
    timestamp: AtomicU64,
    sequence: AtomicU64,
}

impl ManualClock {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp: AtomicU64::new(timestamp),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn set(&self, timestamp: u64) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.timestamp.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }

    fn sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
