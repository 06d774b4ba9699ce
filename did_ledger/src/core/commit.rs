//! Commit barrier shared by the registry and the ledger.
//!
//! Mutations hold the shared side for their whole critical section, notification included.
//! A whole-state snapshot holds the exclusive side, so it never observes a store change
//! without the matching event, or the reverse.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
pub struct CommitLock {
    barrier: RwLock<()>,
}

impl CommitLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Taken once per mutation; never re-entered while held
    pub(crate) fn mutation(&self) -> RwLockReadGuard<'_, ()> {
        self.barrier.read()
    }

    /// Excludes every mutation until dropped
    pub(crate) fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.barrier.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutations_share_and_snapshot_excludes() {
        let lock = CommitLock::new();
        let first = lock.mutation();
        let second = lock.mutation();
        assert!(lock.barrier.try_write().is_none());
        drop((first, second));

        let exclusive = lock.exclusive();
        assert!(lock.barrier.try_read().is_none());
        drop(exclusive);
        assert!(lock.barrier.try_read().is_some());
    }
}
