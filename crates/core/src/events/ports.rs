//! Port interfaces for durable event/calendar/membership storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tandem_domain::{Calendar, Event, Membership, Result};

/// Trait for event row storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a new event row.
    async fn insert_event(&self, event: &Event) -> Result<()>;

    /// Overwrite an existing event row.
    async fn update_event(&self, event: &Event) -> Result<()>;

    /// Delete one event row (memberships cascade).
    async fn delete_event(&self, event_id: &str) -> Result<()>;

    /// Delete a batch of event rows in one statement.
    async fn delete_events(&self, event_ids: &[String]) -> Result<()>;

    /// Fetch one event by id.
    async fn get_event(&self, event_id: &str) -> Result<Option<Event>>;

    /// Fetch event bodies for a set of ids in one query, ordered by start
    /// time.
    async fn events_by_ids(&self, event_ids: &[String]) -> Result<Vec<Event>>;
}

/// Trait for calendar row storage.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Insert a new calendar row.
    async fn insert_calendar(&self, calendar: &Calendar) -> Result<()>;

    /// Delete a calendar row (memberships referencing it cascade).
    async fn delete_calendar(&self, calendar_id: &str) -> Result<()>;

    /// Fetch one calendar by id.
    async fn get_calendar(&self, calendar_id: &str) -> Result<Option<Calendar>>;

    /// List all calendars.
    async fn list_calendars(&self) -> Result<Vec<Calendar>>;
}

/// Trait for event/calendar membership storage.
///
/// Batched lookups are a hard requirement: `memberships_for_events` and
/// `memberships_in_calendars` must execute as a single query keyed by the id
/// set, never one query per event.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Insert all rows in one batched write. Surfaces a conflict when a
    /// `(calendar_id, external_ref)` pair already exists.
    async fn insert_memberships(&self, rows: &[Membership]) -> Result<()>;

    /// Remove the given event/calendar pairs.
    async fn remove_memberships(&self, event_id: &str, calendar_ids: &[String]) -> Result<()>;

    /// All membership rows for the given events, in one query.
    async fn memberships_for_events(&self, event_ids: &[String]) -> Result<Vec<Membership>>;

    /// Membership rows referencing any of the given calendars, in one query.
    async fn memberships_in_calendars(&self, calendar_ids: &[String]) -> Result<Vec<Membership>>;

    /// Look up the membership mirroring a provider event.
    async fn find_by_external_ref(
        &self,
        calendar_id: &str,
        external_ref: &str,
    ) -> Result<Option<Membership>>;

    /// Refresh the provider timestamp on an existing mirrored membership.
    async fn touch_external(
        &self,
        event_id: &str,
        calendar_id: &str,
        external_updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Of the candidate events, the ids that currently have zero
    /// memberships.
    async fn orphaned_events(&self, candidate_event_ids: &[String]) -> Result<Vec<String>>;
}
