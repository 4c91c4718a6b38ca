//! The calendar capability used by the rota planner.
//!
//! The planner never talks HTTP itself. It is handed something that can
//! list, create and delete events, which lets the Google client and test
//! fakes be swapped freely.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::CalendarResult;
use crate::event::{CalendarEvent, EventDraft};

/// A boxed future for async trait methods.
///
/// Boxing keeps [`CalendarApi`] object-safe so callers can hold a
/// `&dyn CalendarApi`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations the rota planner needs from a calendar backend.
///
/// # Example Implementation
///
/// ```ignore
/// impl CalendarApi for MyBackend {
///     fn list_upcoming<'a>(
///         &'a self,
///         calendar_id: &'a str,
///         from: DateTime<Utc>,
///     ) -> BoxFuture<'a, CalendarResult<Vec<CalendarEvent>>> {
///         Box::pin(async move { Ok(Vec::new()) })
///     }
///     // ... other methods
/// }
/// ```
pub trait CalendarApi: Send + Sync {
    /// Lists non-deleted events of `calendar_id` that end after `from`.
    ///
    /// Implementations handle pagination internally.
    fn list_upcoming<'a>(
        &'a self,
        calendar_id: &'a str,
        from: DateTime<Utc>,
    ) -> BoxFuture<'a, CalendarResult<Vec<CalendarEvent>>>;

    /// Inserts an event and returns its new identifier.
    ///
    /// When `notify` is set, attendees receive an invitation email.
    fn insert_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a EventDraft,
        notify: bool,
    ) -> BoxFuture<'a, CalendarResult<String>>;

    /// Deletes an event.
    fn delete_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, CalendarResult<()>>;
}
