//! Connection pool and schema bootstrap.

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tandem_domain::Result;
use tracing::{debug, instrument};

use crate::errors::InfraError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT,
    start_ts INTEGER,
    end_ts INTEGER,
    is_all_day INTEGER NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_ts);

CREATE TABLE IF NOT EXISTS calendars (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    color TEXT,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS event_calendars (
    event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    calendar_id TEXT NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
    external_ref TEXT,
    external_updated_at INTEGER,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (event_id, calendar_id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_event_calendars_external
    ON event_calendars(calendar_id, external_ref)
    WHERE external_ref IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_event_calendars_calendar
    ON event_calendars(calendar_id);

CREATE TABLE IF NOT EXISTS sync_settings (
    user_id TEXT PRIMARY KEY,
    enabled INTEGER NOT NULL DEFAULT 1,
    provider_calendar_id TEXT NOT NULL,
    mirror_calendar_id TEXT NOT NULL,
    sync_token TEXT,
    cursor_updated_at INTEGER,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_attempts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    mode TEXT,
    outcome TEXT NOT NULL,
    events_applied INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    started_at INTEGER NOT NULL,
    finished_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_attempts_user
    ON sync_attempts(user_id, started_at);
";

/// Pooled SQLite database with the Tandem schema applied.
pub struct DatabaseManager {
    pool: Pool<SqliteConnectionManager>,
}

impl DatabaseManager {
    /// Open (or create) the database at `path` and bootstrap the schema.
    ///
    /// Every pooled connection runs with WAL journaling, enforced foreign
    /// keys (the membership cascade depends on it), and a busy timeout.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn new(path: impl AsRef<Path>, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(InfraError::from)?;

        let db = Self { pool };
        db.apply_schema()?;
        debug!(pool_size, "database pool ready");
        Ok(db)
    }

    /// Borrow a pooled connection.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| InfraError::from(e).into())
    }

    fn apply_schema(&self) -> Result<()> {
        let conn = self.get()?;
        conn.execute_batch(SCHEMA).map_err(InfraError::from)?;
        Ok(())
    }
}
