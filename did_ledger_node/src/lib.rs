// DID Ledger Node Library
//
// Configuration, logging and snapshot persistence around the `did_ledger` core, used by the
// `did-ledger` command line tool.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod store;

pub use crate::config::NodeConfig;
pub use crate::error::{NodeError, Result};
pub use crate::node::Node;
pub use crate::store::{SnapshotFormat, SnapshotStore};
