//! Calendar event model.
//!
//! [`EventDraft`] is the request body sent when a shift is created; it
//! serializes to the Calendar v3 `Event` resource shape. [`CalendarEvent`]
//! is the minimal view of an existing event the cleanup loop needs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Transparency value that keeps rota events from blocking attendee time.
pub const TRANSPARENT: &str = "transparent";

/// An all-day event boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDate {
    /// The date, formatted `YYYY-MM-DD` on the wire.
    pub date: NaiveDate,
    /// IANA time zone name, e.g. `UTC`.
    pub time_zone: String,
}

/// An event attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    pub display_name: String,
}

/// A file attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttachment {
    pub file_url: String,
    pub title: String,
}

/// A new event to be inserted into a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDate,
    pub end: EventDate,
    pub recurrence: Vec<String>,
    pub attendees: Vec<Attendee>,
    pub transparency: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<EventAttachment>,
}

impl EventDraft {
    /// Returns true if the insert request must opt in to attachment support.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// An existing event, as returned by a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// Provider event identifier.
    pub id: String,
    /// Event title; empty when the provider omits it.
    pub summary: String,
}

impl CalendarEvent {
    /// Creates a new event view.
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
        }
    }
}
