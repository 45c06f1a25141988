//! External provider sync model types
//!
//! The provider's change history is exposed only as an opaque, expiring
//! cursor. These types model the cursor lifecycle, the per-user sync
//! settings row, provider deltas, and the per-attempt report/log records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque provider-issued cursor: "everything up to this point has been
/// seen". Replaced after every sync that returns a new token; cleared when
/// the provider rejects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub token: String,
    pub updated_at: DateTime<Utc>,
}

/// Per-user external integration settings, one row per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub user_id: String,
    pub enabled: bool,
    /// Calendar id on the provider side (e.g. "primary").
    pub provider_calendar_id: String,
    /// Local calendar the provider events are mirrored into.
    pub mirror_calendar_id: String,
    pub cursor: Option<SyncCursor>,
}

/// OAuth credential set for a provider integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl ProviderCredential {
    /// True when the access token is expired or expires within `threshold`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.expires_at <= now + threshold
    }
}

/// Result of refreshing an access credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshedCredential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// A single event as reported by the provider, already normalized out of the
/// provider's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// Provider-side event identifier; unique per provider calendar.
    pub external_ref: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    /// Provider marked the event cancelled/deleted.
    pub cancelled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of a provider delta response.
///
/// `rejected` is the provider's "this cursor is too old/invalid" signal. It
/// is not an error: the engine reacts by clearing the cursor and restarting
/// in full mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaPage {
    pub items: Vec<ProviderEvent>,
    pub next_page_token: Option<String>,
    pub next_cursor: Option<String>,
    pub rejected: bool,
}

/// Sync execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Incremental,
    Full,
}

impl SyncMode {
    /// Stable label for logs and the attempt side-channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

/// Outcome of a sync trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed,
    /// A sync for this user was already in flight; the trigger was a no-op.
    AlreadyRunning,
    /// Sync is disabled for this user.
    Disabled,
}

/// Report returned by a sync trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub user_id: String,
    pub outcome: SyncOutcome,
    pub mode: Option<SyncMode>,
    pub upserted: usize,
    pub deleted: usize,
    pub cursor_replaced: bool,
}

impl SyncReport {
    /// Report for a trigger that did not run (already in flight/disabled).
    pub fn skipped(user_id: impl Into<String>, outcome: SyncOutcome) -> Self {
        Self {
            user_id: user_id.into(),
            outcome,
            mode: None,
            upserted: 0,
            deleted: 0,
            cursor_replaced: false,
        }
    }
}

/// Side-channel record of one sync attempt. Written best-effort; a failure
/// to record never affects the sync outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAttempt {
    pub id: String,
    pub user_id: String,
    pub mode: Option<SyncMode>,
    pub outcome: String,
    pub events_applied: usize,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
