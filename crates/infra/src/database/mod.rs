//! SQLite-backed implementations of the core storage ports.

pub mod calendar_repository;
pub mod event_repository;
pub mod manager;
pub mod membership_repository;
pub mod sync_attempt_repository;
pub mod sync_state_repository;

pub use calendar_repository::SqliteCalendarStore;
pub use event_repository::SqliteEventStore;
pub use manager::DatabaseManager;
pub use membership_repository::SqliteMembershipStore;
pub use sync_attempt_repository::SqliteSyncAttemptLog;
pub use sync_state_repository::SqliteSyncStateStore;

use chrono::{DateTime, Utc};
use tandem_domain::TandemError;

/// Convert an epoch-seconds column into a UTC timestamp.
pub(crate) fn datetime_from_epoch(epoch: i64) -> Result<DateTime<Utc>, TandemError> {
    DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| TandemError::Database(format!("timestamp out of range: {epoch}")))
}

/// Convert an optional epoch-seconds column into an optional timestamp.
pub(crate) fn opt_datetime_from_epoch(
    epoch: Option<i64>,
) -> Result<Option<DateTime<Utc>>, TandemError> {
    epoch.map(datetime_from_epoch).transpose()
}

/// Epoch seconds for an optional timestamp column.
pub(crate) fn opt_epoch(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(|dt| dt.timestamp())
}
