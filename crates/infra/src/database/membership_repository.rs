//! SQLite-backed implementation of the MembershipStore port.
//!
//! Every multi-id lookup runs as one `IN (...)` query keyed by the id set;
//! the per-event lookup loop this replaces is the classic N+1 pattern the
//! two-phase list fetch exists to avoid.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Row};
use tandem_core::MembershipStore;
use tandem_domain::{Membership, Result, TandemError};
use tracing::{debug, instrument};

use super::manager::DatabaseManager;
use super::{datetime_from_epoch, opt_datetime_from_epoch};
use crate::errors::InfraError;

const MEMBERSHIP_COLUMNS: &str =
    "event_id, calendar_id, external_ref, external_updated_at, created_at";

/// SQLite implementation of `MembershipStore`.
pub struct SqliteMembershipStore {
    db: Arc<DatabaseManager>,
}

impl SqliteMembershipStore {
    /// Create a new membership store over the shared pool.
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<(Membership, Option<i64>, i64)> {
    Ok((
        Membership {
            event_id: row.get(0)?,
            calendar_id: row.get(1)?,
            external_ref: row.get(2)?,
            external_updated_at: None,
            created_at: chrono::DateTime::UNIX_EPOCH,
        },
        row.get(3)?,
        row.get(4)?,
    ))
}

fn finish_membership(
    (mut membership, external_updated_at, created_at): (Membership, Option<i64>, i64),
) -> Result<Membership> {
    membership.external_updated_at = opt_datetime_from_epoch(external_updated_at)?;
    membership.created_at = datetime_from_epoch(created_at)?;
    Ok(membership)
}

fn collect_memberships<F>(rows: rusqlite::MappedRows<'_, F>) -> Result<Vec<Membership>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<(Membership, Option<i64>, i64)>,
{
    let mut memberships = Vec::new();
    for raw in rows {
        memberships.push(finish_membership(raw.map_err(InfraError::from)?)?);
    }
    Ok(memberships)
}

#[async_trait]
impl MembershipStore for SqliteMembershipStore {
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert_memberships(&self, rows: &[Membership]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.db.get()?;
        let tx = conn.transaction().map_err(InfraError::from)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO event_calendars
                         (event_id, calendar_id, external_ref, external_updated_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(InfraError::from)?;

            for row in rows {
                stmt.execute(params![
                    row.event_id,
                    row.calendar_id,
                    row.external_ref,
                    row.external_updated_at.map(|dt| dt.timestamp()),
                    row.created_at.timestamp(),
                ])
                .map_err(InfraError::from)?;
            }
        }
        tx.commit().map_err(InfraError::from)?;

        debug!(count = rows.len(), "inserted membership rows");
        Ok(())
    }

    #[instrument(skip(self, calendar_ids), fields(count = calendar_ids.len()))]
    async fn remove_memberships(
        &self,
        event_id: &str,
        calendar_ids: &[String],
    ) -> Result<()> {
        if calendar_ids.is_empty() {
            return Ok(());
        }

        let conn = self.db.get()?;
        let placeholders = vec!["?"; calendar_ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM event_calendars
             WHERE event_id = ?1 AND calendar_id IN ({placeholders})"
        );

        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&event_id];
        for calendar_id in calendar_ids {
            params_vec.push(calendar_id);
        }

        conn.execute(&sql, params_vec.as_slice()).map_err(InfraError::from)?;
        Ok(())
    }

    async fn memberships_for_events(&self, event_ids: &[String]) -> Result<Vec<Membership>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.get()?;
        let placeholders = vec!["?"; event_ids.len()].join(", ");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MEMBERSHIP_COLUMNS} FROM event_calendars
                 WHERE event_id IN ({placeholders})
                 ORDER BY event_id ASC, calendar_id ASC"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(
                params_from_iter(event_ids.iter()),
                membership_from_row,
            )
            .map_err(InfraError::from)?;
        collect_memberships(rows)
    }

    async fn memberships_in_calendars(
        &self,
        calendar_ids: &[String],
    ) -> Result<Vec<Membership>> {
        if calendar_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.get()?;
        let placeholders = vec!["?"; calendar_ids.len()].join(", ");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {MEMBERSHIP_COLUMNS} FROM event_calendars
                 WHERE calendar_id IN ({placeholders})
                 ORDER BY event_id ASC, calendar_id ASC"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(
                params_from_iter(calendar_ids.iter()),
                membership_from_row,
            )
            .map_err(InfraError::from)?;
        collect_memberships(rows)
    }

    async fn find_by_external_ref(
        &self,
        calendar_id: &str,
        external_ref: &str,
    ) -> Result<Option<Membership>> {
        let conn = self.db.get()?;

        let result = conn.query_row(
            &format!(
                "SELECT {MEMBERSHIP_COLUMNS} FROM event_calendars
                 WHERE calendar_id = ?1 AND external_ref = ?2"
            ),
            params![calendar_id, external_ref],
            membership_from_row,
        );

        match result {
            Ok(raw) => Ok(Some(finish_membership(raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(InfraError::from(e).into()),
        }
    }

    #[instrument(skip(self))]
    async fn touch_external(
        &self,
        event_id: &str,
        calendar_id: &str,
        external_updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.db.get()?;

        let changed = conn
            .execute(
                "UPDATE event_calendars SET external_updated_at = ?3
                 WHERE event_id = ?1 AND calendar_id = ?2",
                params![event_id, calendar_id, external_updated_at.timestamp()],
            )
            .map_err(InfraError::from)?;

        if changed == 0 {
            return Err(TandemError::NotFound(format!(
                "no membership for event {event_id} in calendar {calendar_id}"
            )));
        }
        Ok(())
    }

    async fn orphaned_events(&self, candidate_event_ids: &[String]) -> Result<Vec<String>> {
        if candidate_event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.get()?;
        let placeholders = vec!["?"; candidate_event_ids.len()].join(", ");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT e.id FROM events e
                 WHERE e.id IN ({placeholders})
                   AND NOT EXISTS (
                       SELECT 1 FROM event_calendars ec WHERE ec.event_id = e.id
                   )"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(params_from_iter(candidate_event_ids.iter()), |row| row.get(0))
            .map_err(InfraError::from)?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id.map_err(InfraError::from)?);
        }
        Ok(ids)
    }
}
