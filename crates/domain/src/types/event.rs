//! Event model types
//!
//! An event is owned by its creator and must belong to at least one calendar
//! at all times. The create and update payloads are distinct types so the
//! repository boundary discriminates them explicitly instead of sniffing for
//! an id at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::Membership;
use crate::errors::{Result, TandemError};

/// A calendar event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating an event (no id yet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEventInput {
    pub title: String,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub created_by: String,
}

/// Partial update for an existing event.
///
/// Omitted fields are untouched. The double `Option` on nullable fields
/// distinguishes "leave as is" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_day: Option<bool>,
}

impl EventPatch {
    /// True when the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.all_day.is_none()
    }
}

/// An event annotated with its complete membership set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventWithCalendars {
    pub event: Event,
    pub memberships: Vec<Membership>,
}

impl EventWithCalendars {
    /// Calendar ids this event belongs to.
    pub fn calendar_ids(&self) -> Vec<String> {
        self.memberships.iter().map(|m| m.calendar_id.clone()).collect()
    }
}

/// Validate a start/end pair. Start must not come after end when both are
/// present.
pub fn validate_time_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(TandemError::Validation(format!(
                "event start {start} is after end {end}"
            )));
        }
    }
    Ok(())
}

/// Normalize an all-day range to midnight-to-midnight UTC boundaries.
///
/// The start snaps back to midnight; the end snaps forward to the next
/// midnight (exclusive bound), so a single-day event spans exactly one day.
pub fn normalize_all_day(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    fn floor_to_midnight(dt: DateTime<Utc>) -> DateTime<Utc> {
        dt.date_naive().and_hms_opt(0, 0, 0).map(|naive| naive.and_utc()).unwrap_or(dt)
    }

    let start = start.map(floor_to_midnight);
    let end = end.map(|dt| {
        let midnight = floor_to_midnight(dt);
        if midnight == dt {
            midnight
        } else {
            midnight + chrono::Duration::days(1)
        }
    });

    (start, end)
}
