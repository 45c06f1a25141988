//! Event service: CRUD over events plus their calendar-membership
//! projection.
//!
//! Composes the storage ports with the membership differ and the optimistic
//! coordinator. All mutations record the touched entity ids so the
//! change-feed listener can suppress the client's own echoed notifications.
//!
//! There is no cross-table transaction available from the stores, so the
//! create path carries an explicit compensating delete for the
//! event-written/membership-failed case.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tandem_domain::{
    normalize_all_day, validate_time_range, Calendar, Event, EventPatch, EventWithCalendars,
    ExternalLink, Membership, NewCalendarInput, NewEventInput, Result, TandemError,
};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::ports::{CalendarStore, EventStore, MembershipStore};
use crate::optimistic::OptimisticMutationCoordinator;
use crate::relation::diff_membership;

/// Counts reported by a calendar deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDeletion {
    /// Membership rows removed with the calendar.
    pub removed_memberships: usize,
    /// Events deleted because the calendar was their last membership.
    pub deleted_events: usize,
}

/// Event repository service.
pub struct EventService {
    events: Arc<dyn EventStore>,
    calendars: Arc<dyn CalendarStore>,
    memberships: Arc<dyn MembershipStore>,
    coordinator: Arc<OptimisticMutationCoordinator>,
}

impl EventService {
    /// Create a new event service.
    pub fn new(
        events: Arc<dyn EventStore>,
        calendars: Arc<dyn CalendarStore>,
        memberships: Arc<dyn MembershipStore>,
        coordinator: Arc<OptimisticMutationCoordinator>,
    ) -> Self {
        Self { events, calendars, memberships, coordinator }
    }

    /// Shared optimistic coordinator (for wiring the feed listener).
    pub fn coordinator(&self) -> Arc<OptimisticMutationCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Create an event and attach it to `calendar_ids` in one batched
    /// membership write.
    ///
    /// `external` threads the sync engine's provider linkage onto the
    /// matching membership row; client callers pass `None`.
    ///
    /// # Errors
    ///
    /// `Validation` when `calendar_ids` is empty or the time range is
    /// inverted; `Conflict` when the provider linkage already exists. On a
    /// membership-write failure the event row is rolled back via a
    /// compensating delete and the original error is surfaced.
    #[instrument(skip(self, input, external), fields(created_by = %input.created_by))]
    pub async fn create(
        &self,
        input: NewEventInput,
        calendar_ids: &[String],
        external: Option<&ExternalLink>,
    ) -> Result<EventWithCalendars> {
        let calendar_ids = dedup_ids(calendar_ids);
        if calendar_ids.is_empty() {
            return Err(TandemError::Validation(
                "an event must belong to at least one calendar".into(),
            ));
        }

        validate_time_range(input.start, input.end)?;
        let (start, end) = if input.all_day {
            normalize_all_day(input.start, input.end)
        } else {
            (input.start, input.end)
        };

        let now = Utc::now();
        let event = Event {
            id: Uuid::now_v7().to_string(),
            title: input.title,
            description: input.description,
            start,
            end,
            all_day: input.all_day,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };

        self.events.insert_event(&event).await?;

        let rows: Vec<Membership> = calendar_ids
            .iter()
            .map(|calendar_id| {
                let link = external.filter(|link| link.calendar_id == *calendar_id);
                Membership {
                    event_id: event.id.clone(),
                    calendar_id: calendar_id.clone(),
                    external_ref: link.map(|l| l.external_ref.clone()),
                    external_updated_at: link.and_then(|l| l.external_updated_at),
                    created_at: now,
                }
            })
            .collect();

        if let Err(membership_err) = self.memberships.insert_memberships(&rows).await {
            // No cross-table transaction: roll the event row back explicitly
            // so no orphaned event survives the partial failure.
            if let Err(rollback_err) = self.events.delete_event(&event.id).await {
                error!(
                    event_id = %event.id,
                    error = %rollback_err,
                    "compensating delete failed after membership write error"
                );
            }
            return Err(membership_err);
        }

        self.coordinator.mark_pending(&event.id);
        debug!(event_id = %event.id, calendars = rows.len(), "created event");

        Ok(EventWithCalendars { event, memberships: rows })
    }

    /// Apply a partial update, and optionally reshape the calendar set.
    ///
    /// Only fields present in `patch` are touched. When
    /// `desired_calendar_ids` is provided, the membership table is moved to
    /// exactly that set through the minimal add/remove diff; untouched rows
    /// keep their `external_ref`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the event vanished; `Validation` on an empty desired
    /// set or an inverted time range.
    #[instrument(skip(self, patch, desired_calendar_ids))]
    pub async fn update(
        &self,
        event_id: &str,
        patch: EventPatch,
        desired_calendar_ids: Option<&[String]>,
    ) -> Result<EventWithCalendars> {
        let mut event = self
            .events
            .get_event(event_id)
            .await?
            .ok_or_else(|| TandemError::NotFound(format!("event not found: {event_id}")))?;

        apply_patch(&mut event, patch)?;

        if let Some(desired) = desired_calendar_ids {
            let desired = dedup_ids(desired);
            if desired.is_empty() {
                return Err(TandemError::Validation(
                    "an event must belong to at least one calendar".into(),
                ));
            }

            let current = self.memberships.memberships_for_events(&[event_id.to_string()]).await?;
            let current_ids: Vec<String> =
                current.iter().map(|m| m.calendar_id.clone()).collect();

            let diff = diff_membership(&current_ids, &desired);
            if !diff.is_empty() {
                // Add before remove so the event never passes through an
                // empty membership set.
                if !diff.to_add.is_empty() {
                    let now = Utc::now();
                    let rows: Vec<Membership> = diff
                        .to_add
                        .iter()
                        .map(|calendar_id| Membership {
                            event_id: event_id.to_string(),
                            calendar_id: calendar_id.clone(),
                            external_ref: None,
                            external_updated_at: None,
                            created_at: now,
                        })
                        .collect();
                    self.memberships.insert_memberships(&rows).await?;
                }
                if !diff.to_remove.is_empty() {
                    self.memberships.remove_memberships(event_id, &diff.to_remove).await?;
                }
                debug!(
                    event_id,
                    added = diff.to_add.len(),
                    removed = diff.to_remove.len(),
                    "reshaped event memberships"
                );
            }
        }

        event.updated_at = Utc::now();
        self.events.update_event(&event).await?;

        let memberships =
            self.memberships.memberships_for_events(&[event_id.to_string()]).await?;
        self.coordinator.mark_pending(event_id);

        Ok(EventWithCalendars { event, memberships })
    }

    /// Delete an event. Memberships cascade.
    #[instrument(skip(self))]
    pub async fn delete(&self, event_id: &str) -> Result<()> {
        if self.events.get_event(event_id).await?.is_none() {
            return Err(TandemError::NotFound(format!("event not found: {event_id}")));
        }

        self.events.delete_event(event_id).await?;
        self.coordinator.mark_pending(event_id);
        debug!(event_id, "deleted event");
        Ok(())
    }

    /// Fetch one event with its complete membership set.
    pub async fn get(&self, event_id: &str) -> Result<EventWithCalendars> {
        let event = self
            .events
            .get_event(event_id)
            .await?
            .ok_or_else(|| TandemError::NotFound(format!("event not found: {event_id}")))?;
        let memberships =
            self.memberships.memberships_for_events(&[event_id.to_string()]).await?;
        Ok(EventWithCalendars { event, memberships })
    }

    /// Union of events across all given calendars, each annotated with its
    /// full membership set (including calendars outside the query).
    ///
    /// Two-phase fetch: matching membership rows, then all membership rows
    /// for the collected event ids in one pass, then the event bodies. This
    /// keeps the query count constant regardless of result size.
    #[instrument(skip(self), fields(calendars = calendar_ids.len()))]
    pub async fn list_by_calendars(
        &self,
        calendar_ids: &[String],
    ) -> Result<Vec<EventWithCalendars>> {
        if calendar_ids.is_empty() {
            return Ok(Vec::new());
        }

        let matched = self.memberships.memberships_in_calendars(calendar_ids).await?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let mut event_ids = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for membership in &matched {
            if seen.insert(membership.event_id.clone()) {
                event_ids.push(membership.event_id.clone());
            }
        }

        let all_memberships = self.memberships.memberships_for_events(&event_ids).await?;
        let events = self.events.events_by_ids(&event_ids).await?;

        let mut by_event: HashMap<String, Vec<Membership>> = HashMap::new();
        for membership in all_memberships {
            by_event.entry(membership.event_id.clone()).or_default().push(membership);
        }

        Ok(events
            .into_iter()
            .map(|event| {
                let memberships = by_event.remove(&event.id).unwrap_or_default();
                EventWithCalendars { event, memberships }
            })
            .collect())
    }

    /// Create a calendar.
    #[instrument(skip(self, input), fields(created_by = %input.created_by))]
    pub async fn create_calendar(&self, input: NewCalendarInput) -> Result<Calendar> {
        let now = Utc::now();
        let calendar = Calendar {
            id: Uuid::now_v7().to_string(),
            name: input.name,
            color: input.color,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        self.calendars.insert_calendar(&calendar).await?;
        Ok(calendar)
    }

    /// List all calendars.
    pub async fn list_calendars(&self) -> Result<Vec<Calendar>> {
        self.calendars.list_calendars().await
    }

    /// Delete a calendar, cascading its memberships, then delete any event
    /// the cascade left with zero memberships (the non-empty membership
    /// invariant: orphaned events are removed, never left dangling).
    #[instrument(skip(self))]
    pub async fn delete_calendar(&self, calendar_id: &str) -> Result<CalendarDeletion> {
        if self.calendars.get_calendar(calendar_id).await?.is_none() {
            return Err(TandemError::NotFound(format!("calendar not found: {calendar_id}")));
        }

        let affected =
            self.memberships.memberships_in_calendars(&[calendar_id.to_string()]).await?;
        let candidate_ids: Vec<String> =
            affected.iter().map(|m| m.event_id.clone()).collect();

        self.calendars.delete_calendar(calendar_id).await?;

        let orphaned = if candidate_ids.is_empty() {
            Vec::new()
        } else {
            self.memberships.orphaned_events(&candidate_ids).await?
        };

        if !orphaned.is_empty() {
            self.events.delete_events(&orphaned).await?;
            for event_id in &orphaned {
                self.coordinator.mark_pending(event_id);
            }
            warn!(
                calendar_id,
                orphaned = orphaned.len(),
                "deleted events orphaned by calendar removal"
            );
        }

        self.coordinator.mark_pending(calendar_id);

        Ok(CalendarDeletion {
            removed_memberships: affected.len(),
            deleted_events: orphaned.len(),
        })
    }
}

/// Apply the provided patch fields; omitted fields are untouched. The
/// resulting time range is validated and all-day bounds are re-normalized.
fn apply_patch(event: &mut Event, patch: EventPatch) -> Result<()> {
    if let Some(title) = patch.title {
        event.title = title;
    }
    if let Some(description) = patch.description {
        event.description = description;
    }
    if let Some(start) = patch.start {
        event.start = start;
    }
    if let Some(end) = patch.end {
        event.end = end;
    }
    if let Some(all_day) = patch.all_day {
        event.all_day = all_day;
    }

    validate_time_range(event.start, event.end)?;
    if event.all_day {
        let (start, end) = normalize_all_day(event.start, event.end);
        event.start = start;
        event.end = end;
    }
    Ok(())
}

/// Preserve first-occurrence order while dropping duplicate ids.
fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}
