//! Event and calendar lifecycle management

pub mod ports;
pub mod service;

pub use service::{CalendarDeletion, EventService};
