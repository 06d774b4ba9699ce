//! Node state: the in-memory ledger bound to its snapshot file

use std::sync::Arc;

use did_ledger::{IdentityLedger, Principal, SystemClock};
use tracing::info;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::store::SnapshotStore;

pub struct Node {
    pub config: NodeConfig,
    pub ledger: IdentityLedger,
    store: SnapshotStore,
    caller: Principal,
}

impl Node {
    /// Restore from the configured snapshot, or start empty when none exists yet
    pub fn open(config: NodeConfig) -> Result<Self> {
        let store = SnapshotStore::new(config.storage.snapshot_path.clone());
        let ledger = match store.load()? {
            Some(snapshot) => IdentityLedger::restore(snapshot)?,
            None => {
                info!(
                    "Starting empty ledger owned by {}",
                    config.node.owner()
                );
                IdentityLedger::new(
                    Principal::new(config.node.owner()),
                    Arc::new(SystemClock::new()),
                )
            }
        };
        let caller = Principal::new(config.node.principal.clone());

        Ok(Self {
            config,
            ledger,
            store,
            caller,
        })
    }

    /// Principal attached to mutations issued through this node
    pub fn caller(&self) -> &Principal {
        &self.caller
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Write the current state to disk unconditionally
    pub fn save(&self) -> Result<()> {
        self.store.save(&self.ledger.snapshot())
    }

    /// Write the current state to disk if autosave is enabled
    pub fn persist(&self) -> Result<()> {
        if self.config.storage.autosave {
            self.save()?;
        }
        Ok(())
    }
}
