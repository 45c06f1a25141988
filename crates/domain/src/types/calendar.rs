//! Calendar and membership model types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar row. Calendars have a lifecycle independent from events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCalendarInput {
    pub name: String,
    pub color: Option<String>,
    pub created_by: String,
}

/// Junction row linking one event to one calendar.
///
/// `external_ref` is populated only for memberships created by the external
/// sync engine; it is the foreign key into the provider's event id space and
/// is unique per `(calendar_id, external_ref)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub event_id: String,
    pub calendar_id: String,
    pub external_ref: Option<String>,
    pub external_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Provider linkage attached to a membership at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLink {
    pub calendar_id: String,
    pub external_ref: String,
    pub external_updated_at: Option<DateTime<Utc>>,
}
