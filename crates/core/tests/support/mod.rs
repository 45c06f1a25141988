//! Shared in-memory mocks for core integration tests.

#![allow(dead_code)]

pub mod feed;
pub mod provider;
pub mod stores;

pub use feed::{CountingInvalidator, MockPushChannel};
pub use provider::{
    MemoryCredentialStore, MemorySyncState, RecordingAttemptLog, ScriptedProvider,
};
pub use stores::MemoryStore;
