//! Configuration management

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FEED_DEBOUNCE_MS, DEFAULT_SUPPRESSION_WINDOW_MS, DEFAULT_SYNC_INTERVAL_SECS,
};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub feed: FeedConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

/// External provider sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub interval_seconds: u64,
    pub enabled: bool,
}

/// Change-feed listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub debounce_ms: u64,
    pub suppression_window_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { path: "tandem.db".to_string(), pool_size: 4 },
            sync: SyncConfig { interval_seconds: DEFAULT_SYNC_INTERVAL_SECS, enabled: true },
            feed: FeedConfig {
                debounce_ms: DEFAULT_FEED_DEBOUNCE_MS,
                suppression_window_ms: DEFAULT_SUPPRESSION_WINDOW_MS,
            },
        }
    }
}
