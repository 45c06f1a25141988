//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Optimistic suppression window: how long a local write suppresses its own
// echoed change notification. Tunable; the default errs toward the short end
// so a legitimate remote update reusing the same id is not silenced for long.
pub const DEFAULT_SUPPRESSION_WINDOW_MS: u64 = 3_000;

// Change-feed debounce: bursts of notifications within this window coalesce
// into a single re-fetch.
pub const DEFAULT_FEED_DEBOUNCE_MS: u64 = 250;

// External sync configuration
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 900;
pub const CREDENTIAL_REFRESH_THRESHOLD_SECS: i64 = 300;
pub const PROVIDER_PAGE_SIZE: u32 = 250;

// Per-user budget for sync-triggering actions
pub const DEFAULT_SYNC_QUOTA_LIMIT: u32 = 30;
pub const DEFAULT_SYNC_QUOTA_WINDOW_SECS: u64 = 3_600;
