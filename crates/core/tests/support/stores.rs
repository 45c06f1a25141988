//! In-memory implementation of the storage ports.
//!
//! One shared state models the single durable store, so cascade semantics
//! (deleting an event or calendar removes its membership rows) match the
//! real SQLite adapter. Membership write rows are counted so tests can
//! assert the minimal-diff property.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tandem_core::{CalendarStore, EventStore, MembershipStore};
use tandem_domain::{Calendar, Event, Membership, Result as DomainResult, TandemError};

#[derive(Default)]
struct State {
    events: HashMap<String, Event>,
    calendars: HashMap<String, Calendar>,
    memberships: Vec<Membership>,
    membership_rows_inserted: usize,
    membership_rows_removed: usize,
    fail_next_membership_insert: bool,
}

/// In-memory mock for `EventStore` + `CalendarStore` + `MembershipStore`.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows written through `insert_memberships` since construction/reset.
    pub fn membership_rows_inserted(&self) -> usize {
        self.state.lock().unwrap().membership_rows_inserted
    }

    /// Rows removed through `remove_memberships` since construction/reset.
    pub fn membership_rows_removed(&self) -> usize {
        self.state.lock().unwrap().membership_rows_removed
    }

    /// Zero the membership write counters.
    pub fn reset_membership_counters(&self) {
        let mut state = self.state.lock().unwrap();
        state.membership_rows_inserted = 0;
        state.membership_rows_removed = 0;
    }

    /// Make the next `insert_memberships` call fail (for the compensation
    /// path).
    pub fn fail_next_membership_insert(&self) {
        self.state.lock().unwrap().fail_next_membership_insert = true;
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn membership_count(&self) -> usize {
        self.state.lock().unwrap().memberships.len()
    }

    pub fn memberships_snapshot(&self) -> Vec<Membership> {
        self.state.lock().unwrap().memberships.clone()
    }

    pub fn events_snapshot(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.values().cloned().collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: &Event) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn update_event(&self, event: &Event) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.events.contains_key(&event.id) {
            return Err(TandemError::NotFound(format!("event not found: {}", event.id)));
        }
        state.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.events.remove(event_id);
        // Memberships cascade with the event row.
        state.memberships.retain(|m| m.event_id != event_id);
        Ok(())
    }

    async fn delete_events(&self, event_ids: &[String]) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        for event_id in event_ids {
            state.events.remove(event_id);
        }
        state.memberships.retain(|m| !event_ids.contains(&m.event_id));
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> DomainResult<Option<Event>> {
        Ok(self.state.lock().unwrap().events.get(event_id).cloned())
    }

    async fn events_by_ids(&self, event_ids: &[String]) -> DomainResult<Vec<Event>> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<Event> = event_ids
            .iter()
            .filter_map(|id| state.events.get(id).cloned())
            .collect();
        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }
}

#[async_trait]
impl CalendarStore for MemoryStore {
    async fn insert_calendar(&self, calendar: &Calendar) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calendars.insert(calendar.id.clone(), calendar.clone());
        Ok(())
    }

    async fn delete_calendar(&self, calendar_id: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calendars.remove(calendar_id);
        // Memberships referencing the calendar cascade.
        state.memberships.retain(|m| m.calendar_id != calendar_id);
        Ok(())
    }

    async fn get_calendar(&self, calendar_id: &str) -> DomainResult<Option<Calendar>> {
        Ok(self.state.lock().unwrap().calendars.get(calendar_id).cloned())
    }

    async fn list_calendars(&self) -> DomainResult<Vec<Calendar>> {
        let mut calendars: Vec<Calendar> =
            self.state.lock().unwrap().calendars.values().cloned().collect();
        calendars.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(calendars)
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn insert_memberships(&self, rows: &[Membership]) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();

        if state.fail_next_membership_insert {
            state.fail_next_membership_insert = false;
            return Err(TandemError::Database("membership write failed".into()));
        }

        for row in rows {
            if let Some(external_ref) = &row.external_ref {
                let duplicate = state.memberships.iter().any(|m| {
                    m.calendar_id == row.calendar_id
                        && m.external_ref.as_deref() == Some(external_ref.as_str())
                });
                if duplicate {
                    return Err(TandemError::Conflict(format!(
                        "membership already mirrors {external_ref} in {}",
                        row.calendar_id
                    )));
                }
            }
            state.memberships.push(row.clone());
        }
        state.membership_rows_inserted += rows.len();
        Ok(())
    }

    async fn remove_memberships(
        &self,
        event_id: &str,
        calendar_ids: &[String],
    ) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.memberships.len();
        state
            .memberships
            .retain(|m| !(m.event_id == event_id && calendar_ids.contains(&m.calendar_id)));
        state.membership_rows_removed += before - state.memberships.len();
        Ok(())
    }

    async fn memberships_for_events(
        &self,
        event_ids: &[String],
    ) -> DomainResult<Vec<Membership>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .filter(|m| event_ids.contains(&m.event_id))
            .cloned()
            .collect())
    }

    async fn memberships_in_calendars(
        &self,
        calendar_ids: &[String],
    ) -> DomainResult<Vec<Membership>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .filter(|m| calendar_ids.contains(&m.calendar_id))
            .cloned()
            .collect())
    }

    async fn find_by_external_ref(
        &self,
        calendar_id: &str,
        external_ref: &str,
    ) -> DomainResult<Option<Membership>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .find(|m| {
                m.calendar_id == calendar_id
                    && m.external_ref.as_deref() == Some(external_ref)
            })
            .cloned())
    }

    async fn touch_external(
        &self,
        event_id: &str,
        calendar_id: &str,
        external_updated_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        for membership in &mut state.memberships {
            if membership.event_id == event_id && membership.calendar_id == calendar_id {
                membership.external_updated_at = Some(external_updated_at);
            }
        }
        Ok(())
    }

    async fn orphaned_events(
        &self,
        candidate_event_ids: &[String],
    ) -> DomainResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(candidate_event_ids
            .iter()
            .filter(|id| !state.memberships.iter().any(|m| m.event_id == **id))
            .cloned()
            .collect())
    }
}
