//! umlsync: partitioned UML model store with subtree copy, generalization
//! flattening and reconciliation against vendor repositories

pub mod cli;
pub mod config;
pub mod copy;
pub mod error;
pub mod external;
pub mod identity;
pub mod model;
pub mod store;
pub mod sync;
pub mod transform;

pub use error::{Result, SyncError};
