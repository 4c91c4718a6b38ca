//! Core types: rota config, shift schedule, event model, planner
//!
//! The planner only sees the [`CalendarApi`] capability; authentication and
//! HTTP live in the provider crate.

pub mod api;
pub mod error;
pub mod event;
pub mod planner;
pub mod rota;
pub mod schedule;
pub mod tracing;

pub use api::{BoxFuture, CalendarApi};
pub use error::{CalendarError, CalendarErrorCode, CalendarResult};
pub use event::{Attendee, CalendarEvent, EventAttachment, EventDate, EventDraft};
pub use planner::{CleanupReport, PlanError, cleanup, create_rota};
pub use rota::{Attachment, Member, RotaConfig, RotaError, TitleTemplate};
pub use schedule::{Shift, build_event, plan_shifts};
pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
