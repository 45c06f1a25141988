//! SQLite-backed implementation of the SyncStateStore port.
//!
//! One row per user per integration carries the enabled flag, the provider
//! and mirror calendar ids, and the opaque sync cursor. The cursor is
//! replaced after every sync returning a new token and nulled when the
//! provider rejects it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use tandem_core::SyncStateStore;
use tandem_domain::{Result, SyncCursor, SyncSettings, TandemError};
use tracing::{debug, instrument};

use super::manager::DatabaseManager;
use super::datetime_from_epoch;
use crate::errors::InfraError;

/// SQLite implementation of `SyncStateStore`.
pub struct SqliteSyncStateStore {
    db: Arc<DatabaseManager>,
}

impl SqliteSyncStateStore {
    /// Create a new sync-state store over the shared pool.
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Insert or replace the settings row for a user (cursor untouched on
    /// replace).
    #[instrument(skip(self, settings), fields(user_id = %settings.user_id))]
    pub async fn upsert_settings(&self, settings: &SyncSettings) -> Result<()> {
        let conn = self.db.get()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO sync_settings
                 (user_id, enabled, provider_calendar_id, mirror_calendar_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 enabled = excluded.enabled,
                 provider_calendar_id = excluded.provider_calendar_id,
                 mirror_calendar_id = excluded.mirror_calendar_id,
                 updated_at = excluded.updated_at",
            params![
                settings.user_id,
                settings.enabled,
                settings.provider_calendar_id,
                settings.mirror_calendar_id,
                now,
            ],
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for SqliteSyncStateStore {
    async fn get_settings(&self, user_id: &str) -> Result<Option<SyncSettings>> {
        let conn = self.db.get()?;

        let result = conn.query_row(
            "SELECT user_id, enabled, provider_calendar_id, mirror_calendar_id,
                    sync_token, cursor_updated_at
             FROM sync_settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            },
        );

        match result {
            Ok((user_id, enabled, provider_calendar_id, mirror_calendar_id, token, cursor_ts)) => {
                let cursor = match (token, cursor_ts) {
                    (Some(token), Some(ts)) => {
                        Some(SyncCursor { token, updated_at: datetime_from_epoch(ts)? })
                    }
                    (Some(token), None) => {
                        Some(SyncCursor { token, updated_at: chrono::DateTime::UNIX_EPOCH })
                    }
                    _ => None,
                };
                Ok(Some(SyncSettings {
                    user_id,
                    enabled,
                    provider_calendar_id,
                    mirror_calendar_id,
                    cursor,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(InfraError::from(e).into()),
        }
    }

    #[instrument(skip(self, token))]
    async fn save_cursor(&self, user_id: &str, token: &str) -> Result<()> {
        let conn = self.db.get()?;
        let now = Utc::now().timestamp();

        let changed = conn
            .execute(
                "UPDATE sync_settings
                 SET sync_token = ?1, cursor_updated_at = ?2, updated_at = ?2
                 WHERE user_id = ?3",
                params![token, now, user_id],
            )
            .map_err(InfraError::from)?;

        if changed == 0 {
            return Err(TandemError::NotFound(format!("no sync settings for {user_id}")));
        }

        debug!(user_id, "saved sync cursor");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_cursor(&self, user_id: &str) -> Result<()> {
        let conn = self.db.get()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE sync_settings
             SET sync_token = NULL, cursor_updated_at = NULL, updated_at = ?1
             WHERE user_id = ?2",
            params![now, user_id],
        )
        .map_err(InfraError::from)?;

        debug!(user_id, "cleared sync cursor");
        Ok(())
    }
}
