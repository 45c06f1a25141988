//! Domain types and models

pub mod calendar;
pub mod event;
pub mod feed;
pub mod sync;

pub use calendar::{Calendar, ExternalLink, Membership, NewCalendarInput};
pub use event::{
    normalize_all_day, validate_time_range, Event, EventPatch, EventWithCalendars, NewEventInput,
};
pub use feed::{ChangeNotification, EntityKind};
pub use sync::{
    DeltaPage, ProviderCredential, ProviderEvent, RefreshedCredential, SyncAttempt, SyncCursor,
    SyncMode, SyncOutcome, SyncReport, SyncSettings,
};
