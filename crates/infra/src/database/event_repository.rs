//! SQLite-backed implementation of the EventStore port.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Row};
use tandem_core::EventStore;
use tandem_domain::{Event, Result};
use tracing::{debug, instrument};

use super::manager::DatabaseManager;
use super::{datetime_from_epoch, opt_datetime_from_epoch, opt_epoch};
use crate::errors::InfraError;

const EVENT_COLUMNS: &str =
    "id, title, description, start_ts, end_ts, is_all_day, created_by, created_at, updated_at";

/// SQLite implementation of `EventStore`.
pub struct SqliteEventStore {
    db: Arc<DatabaseManager>,
}

impl SqliteEventStore {
    /// Create a new event store over the shared pool.
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<(Event, i64, i64, Option<i64>, Option<i64>)> {
    Ok((
        Event {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            start: None,
            end: None,
            all_day: row.get(5)?,
            created_by: row.get(6)?,
            created_at: chrono::DateTime::UNIX_EPOCH,
            updated_at: chrono::DateTime::UNIX_EPOCH,
        },
        row.get(7)?,
        row.get(8)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn finish_event(
    (mut event, created_at, updated_at, start_ts, end_ts): (
        Event,
        i64,
        i64,
        Option<i64>,
        Option<i64>,
    ),
) -> Result<Event> {
    event.created_at = datetime_from_epoch(created_at)?;
    event.updated_at = datetime_from_epoch(updated_at)?;
    event.start = opt_datetime_from_epoch(start_ts)?;
    event.end = opt_datetime_from_epoch(end_ts)?;
    Ok(event)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn insert_event(&self, event: &Event) -> Result<()> {
        let conn = self.db.get()?;

        conn.execute(
            "INSERT INTO events (id, title, description, start_ts, end_ts, is_all_day,
                                 created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.id,
                event.title,
                event.description,
                opt_epoch(event.start),
                opt_epoch(event.end),
                event.all_day,
                event.created_by,
                event.created_at.timestamp(),
                event.updated_at.timestamp(),
            ],
        )
        .map_err(InfraError::from)?;

        debug!(event_id = %event.id, "inserted event");
        Ok(())
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn update_event(&self, event: &Event) -> Result<()> {
        let conn = self.db.get()?;

        conn.execute(
            "UPDATE events
             SET title = ?2, description = ?3, start_ts = ?4, end_ts = ?5,
                 is_all_day = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                event.id,
                event.title,
                event.description,
                opt_epoch(event.start),
                opt_epoch(event.end),
                event.all_day,
                event.updated_at.timestamp(),
            ],
        )
        .map_err(InfraError::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, event_id: &str) -> Result<()> {
        let conn = self.db.get()?;
        conn.execute("DELETE FROM events WHERE id = ?1", params![event_id])
            .map_err(InfraError::from)?;
        Ok(())
    }

    #[instrument(skip(self, event_ids), fields(count = event_ids.len()))]
    async fn delete_events(&self, event_ids: &[String]) -> Result<()> {
        if event_ids.is_empty() {
            return Ok(());
        }

        let conn = self.db.get()?;
        let placeholders = vec!["?"; event_ids.len()].join(", ");
        conn.execute(
            &format!("DELETE FROM events WHERE id IN ({placeholders})"),
            params_from_iter(event_ids.iter()),
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>> {
        let conn = self.db.get()?;

        let result = conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![event_id],
            event_from_row,
        );

        match result {
            Ok(raw) => Ok(Some(finish_event(raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(InfraError::from(e).into()),
        }
    }

    #[instrument(skip(self, event_ids), fields(count = event_ids.len()))]
    async fn events_by_ids(&self, event_ids: &[String]) -> Result<Vec<Event>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.get()?;
        let placeholders = vec!["?"; event_ids.len()].join(", ");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE id IN ({placeholders})
                 ORDER BY start_ts ASC, id ASC"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(params_from_iter(event_ids.iter()), event_from_row)
            .map_err(InfraError::from)?;

        let mut events = Vec::new();
        for raw in rows {
            events.push(finish_event(raw.map_err(InfraError::from)?)?);
        }
        Ok(events)
    }
}
