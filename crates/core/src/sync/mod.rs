//! External-provider incremental synchronization

pub mod engine;
pub mod ports;
pub mod quota;

pub use engine::{ExternalSyncEngine, SyncEngineConfig};
