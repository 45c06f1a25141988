//! SQLite-backed implementation of the CalendarStore port.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Row};
use tandem_core::CalendarStore;
use tandem_domain::{Calendar, Result};
use tracing::{debug, instrument};

use super::manager::DatabaseManager;
use super::datetime_from_epoch;
use crate::errors::InfraError;

/// SQLite implementation of `CalendarStore`.
pub struct SqliteCalendarStore {
    db: Arc<DatabaseManager>,
}

impl SqliteCalendarStore {
    /// Create a new calendar store over the shared pool.
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

fn calendar_from_row(row: &Row<'_>) -> rusqlite::Result<(Calendar, i64, i64)> {
    Ok((
        Calendar {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            created_by: row.get(3)?,
            created_at: chrono::DateTime::UNIX_EPOCH,
            updated_at: chrono::DateTime::UNIX_EPOCH,
        },
        row.get(4)?,
        row.get(5)?,
    ))
}

fn finish_calendar((mut calendar, created_at, updated_at): (Calendar, i64, i64)) -> Result<Calendar> {
    calendar.created_at = datetime_from_epoch(created_at)?;
    calendar.updated_at = datetime_from_epoch(updated_at)?;
    Ok(calendar)
}

#[async_trait]
impl CalendarStore for SqliteCalendarStore {
    #[instrument(skip(self, calendar), fields(calendar_id = %calendar.id))]
    async fn insert_calendar(&self, calendar: &Calendar) -> Result<()> {
        let conn = self.db.get()?;

        conn.execute(
            "INSERT INTO calendars (id, name, color, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                calendar.id,
                calendar.name,
                calendar.color,
                calendar.created_by,
                calendar.created_at.timestamp(),
                calendar.updated_at.timestamp(),
            ],
        )
        .map_err(InfraError::from)?;

        debug!(calendar_id = %calendar.id, "inserted calendar");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_calendar(&self, calendar_id: &str) -> Result<()> {
        let conn = self.db.get()?;
        conn.execute("DELETE FROM calendars WHERE id = ?1", params![calendar_id])
            .map_err(InfraError::from)?;
        Ok(())
    }

    async fn get_calendar(&self, calendar_id: &str) -> Result<Option<Calendar>> {
        let conn = self.db.get()?;

        let result = conn.query_row(
            "SELECT id, name, color, created_by, created_at, updated_at
             FROM calendars WHERE id = ?1",
            params![calendar_id],
            calendar_from_row,
        );

        match result {
            Ok(raw) => Ok(Some(finish_calendar(raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(InfraError::from(e).into()),
        }
    }

    async fn list_calendars(&self) -> Result<Vec<Calendar>> {
        let conn = self.db.get()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, color, created_by, created_at, updated_at
                 FROM calendars ORDER BY name ASC, id ASC",
            )
            .map_err(InfraError::from)?;

        let rows = stmt.query_map([], calendar_from_row).map_err(InfraError::from)?;

        let mut calendars = Vec::new();
        for raw in rows {
            calendars.push(finish_calendar(raw.map_err(InfraError::from)?)?);
        }
        Ok(calendars)
    }
}
