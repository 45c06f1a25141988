//! SQLite-backed implementation of the SyncAttemptLog port.
//!
//! Best-effort side channel: the engine logs attempts through this store and
//! swallows any failure, so nothing here may block or poison the sync path.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;
use tandem_core::SyncAttemptLog;
use tandem_domain::{Result, SyncAttempt, SyncMode};

use super::manager::DatabaseManager;
use crate::errors::InfraError;

/// SQLite implementation of `SyncAttemptLog`.
pub struct SqliteSyncAttemptLog {
    db: Arc<DatabaseManager>,
}

impl SqliteSyncAttemptLog {
    /// Create a new attempt log over the shared pool.
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Most recent attempts for a user, newest first (diagnostics surface).
    pub async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<SyncAttempt>> {
        let conn = self.db.get()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, mode, outcome, events_applied, error,
                        started_at, finished_at
                 FROM sync_attempts
                 WHERE user_id = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2",
            )
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })
            .map_err(InfraError::from)?;

        let mut attempts = Vec::new();
        for raw in rows {
            let (id, user_id, mode, outcome, events_applied, error, started_at, finished_at) =
                raw.map_err(InfraError::from)?;
            attempts.push(SyncAttempt {
                id,
                user_id,
                mode: mode.as_deref().and_then(parse_mode),
                outcome,
                events_applied: events_applied.max(0) as usize,
                error,
                started_at: super::datetime_from_epoch(started_at)?,
                finished_at: super::datetime_from_epoch(finished_at)?,
            });
        }
        Ok(attempts)
    }
}

fn parse_mode(value: &str) -> Option<SyncMode> {
    match value {
        "incremental" => Some(SyncMode::Incremental),
        "full" => Some(SyncMode::Full),
        _ => None,
    }
}

#[async_trait]
impl SyncAttemptLog for SqliteSyncAttemptLog {
    async fn record(&self, attempt: &SyncAttempt) -> Result<()> {
        let conn = self.db.get()?;

        conn.execute(
            "INSERT INTO sync_attempts
                 (id, user_id, mode, outcome, events_applied, error, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                attempt.id,
                attempt.user_id,
                attempt.mode.map(SyncMode::as_str),
                attempt.outcome,
                attempt.events_applied as i64,
                attempt.error,
                attempt.started_at.timestamp(),
                attempt.finished_at.timestamp(),
            ],
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}
