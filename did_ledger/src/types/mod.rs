//! Core data types shared by the registry, the ledger and the query surface.

pub mod did_types;
pub mod error;
pub mod verification_types;
