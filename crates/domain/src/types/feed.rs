//! Change-feed notification types

use serde::{Deserialize, Serialize};

/// Kind of entity a change notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Event,
    Calendar,
}

/// A single push-channel change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub calendar_id: Option<String>,
}

impl ChangeNotification {
    /// Notification for an event change, optionally scoped to a calendar.
    pub fn event(entity_id: impl Into<String>, calendar_id: Option<String>) -> Self {
        Self { entity_kind: EntityKind::Event, entity_id: entity_id.into(), calendar_id }
    }

    /// Notification for a calendar change.
    pub fn calendar(entity_id: impl Into<String>) -> Self {
        Self { entity_kind: EntityKind::Calendar, entity_id: entity_id.into(), calendar_id: None }
    }
}
