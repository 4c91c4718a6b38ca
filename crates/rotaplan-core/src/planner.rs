//! Rota creation and cleanup.
//!
//! Both loops run strictly in sequence against a [`CalendarApi`]. Progress
//! is printed for the operator; diagnostics go through `tracing`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::CalendarApi;
use crate::error::CalendarError;
use crate::rota::{Member, RotaConfig, RotaError};
use crate::schedule::{build_event, plan_shifts};

/// Errors that abort a planner run.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The rota could not be turned into events.
    #[error(transparent)]
    Rota(#[from] RotaError),

    /// Inserting a shift event failed.
    #[error("failed to create shift for {member}: {source}")]
    Shift {
        member: Member,
        #[source]
        source: CalendarError,
    },

    /// Listing upcoming events failed.
    #[error("unable to retrieve upcoming events: {0}")]
    List(#[source] CalendarError),
}

/// Outcome of a cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Events deleted.
    pub deleted: usize,
    /// Events whose deletion failed.
    pub failed: usize,
}

/// Creates one recurring event per member.
///
/// Stops at the first failed insert. Returns the created event identifiers.
pub async fn create_rota(
    api: &dyn CalendarApi,
    config: &RotaConfig,
) -> Result<Vec<String>, PlanError> {
    let mut created = Vec::with_capacity(config.members.len());

    for shift in plan_shifts(config)? {
        println!(
            "creating shift for {}, first shift starting on {} and finishing on {} ({} week(s))",
            shift.member.name, shift.start, shift.end, config.shift_duration
        );
        let event = build_event(config, &shift)?;
        let id = api
            .insert_event(&config.calendar_id, &event, config.notify)
            .await
            .map_err(|source| PlanError::Shift {
                member: shift.member.clone(),
                source,
            })?;
        debug!(event_id = %id, member = %shift.member, "created shift event");
        created.push(id);
    }

    info!("created {} shift events in {}", created.len(), config.calendar_id);
    Ok(created)
}

/// Deletes every upcoming event of a calendar.
///
/// A failed delete is reported and skipped; only a failed listing aborts.
pub async fn cleanup(
    api: &dyn CalendarApi,
    calendar_id: &str,
    now: DateTime<Utc>,
) -> Result<CleanupReport, PlanError> {
    let events = api
        .list_upcoming(calendar_id, now)
        .await
        .map_err(PlanError::List)?;

    let mut report = CleanupReport::default();
    if events.is_empty() {
        println!("No upcoming events found.");
        return Ok(report);
    }

    for event in events {
        println!("deleting {}", event.summary);
        match api.delete_event(calendar_id, &event.id).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                warn!(event_id = %event.id, "failed to delete event: {}", e);
                eprintln!("failed to delete {}: {}", event.summary, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "cleanup of {} done: {} deleted, {} failed",
        calendar_id, report.deleted, report.failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;
    use crate::api::BoxFuture;
    use crate::error::CalendarResult;
    use crate::event::{CalendarEvent, EventDraft};

    /// Records every call and replays canned listings.
    #[derive(Default)]
    struct FakeCalendar {
        created: Mutex<Vec<(String, EventDraft, bool)>>,
        deleted: Mutex<Vec<String>>,
        upcoming: Vec<CalendarEvent>,
        fail_insert_for: Option<String>,
        fail_delete_for: HashSet<String>,
        fail_list: bool,
    }

    impl CalendarApi for FakeCalendar {
        fn list_upcoming<'a>(
            &'a self,
            _calendar_id: &'a str,
            _from: DateTime<Utc>,
        ) -> BoxFuture<'a, CalendarResult<Vec<CalendarEvent>>> {
            Box::pin(async move {
                if self.fail_list {
                    return Err(CalendarError::server("boom"));
                }
                Ok(self.upcoming.clone())
            })
        }

        fn insert_event<'a>(
            &'a self,
            calendar_id: &'a str,
            event: &'a EventDraft,
            notify: bool,
        ) -> BoxFuture<'a, CalendarResult<String>> {
            Box::pin(async move {
                if self
                    .fail_insert_for
                    .as_deref()
                    .is_some_and(|name| event.summary.contains(name))
                {
                    return Err(CalendarError::bad_request("rejected"));
                }
                let mut created = self.created.lock().unwrap();
                created.push((calendar_id.to_string(), event.clone(), notify));
                Ok(format!("event-{}", created.len()))
            })
        }

        fn delete_event<'a>(
            &'a self,
            _calendar_id: &'a str,
            event_id: &'a str,
        ) -> BoxFuture<'a, CalendarResult<()>> {
            Box::pin(async move {
                if self.fail_delete_for.contains(event_id) {
                    return Err(CalendarError::not_found("gone"));
                }
                self.deleted.lock().unwrap().push(event_id.to_string());
                Ok(())
            })
        }
    }

    const ROTA: &str = r#"
shiftDuration: 1
startDate: 2024-11-03
calendarID: calendarID
attachments:
  - name: attachmentName
    url: fileURL
members:
  - name: Test User 1
    email: test1@example.com
  - name: Test User 2
    email: test2@example.com
"#;

    #[tokio::test]
    async fn creates_one_event_per_member() {
        let api = FakeCalendar::default();
        let config = RotaConfig::from_yaml(ROTA).unwrap();

        let ids = create_rota(&api, &config).await.unwrap();
        assert_eq!(ids, vec!["event-1".to_string(), "event-2".to_string()]);

        let created = api.created.lock().unwrap();
        assert_eq!(created.len(), 2);
        for (calendar_id, event, notify) in created.iter() {
            assert_eq!(calendar_id, "calendarID");
            assert!(!notify);
            assert!(
                event.summary.contains("Test User 1") || event.summary.contains("Test User 2"),
                "summary does not name a member: {}",
                event.summary
            );
            assert_eq!(event.attachments.len(), 1);
            assert_eq!(event.attachments[0].file_url, "fileURL");
            assert_eq!(event.attachments[0].title, "attachmentName");
        }
    }

    #[tokio::test]
    async fn custom_title_is_rendered() {
        let api = FakeCalendar::default();
        let yaml = r#"
shiftDuration: 1
startDate: 2024-11-03
calendarID: calendarID
notify: true
members:
  - name: Test User 1
    email: test1@example.com
title: foobar {{.Name}}
"#;
        let config = RotaConfig::from_yaml(yaml).unwrap();
        create_rota(&api, &config).await.unwrap();

        let created = api.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].1.summary, "foobar Test User 1");
        assert!(created[0].2);
    }

    #[tokio::test]
    async fn failed_insert_names_the_member() {
        let api = FakeCalendar {
            fail_insert_for: Some("Test User 2".to_string()),
            ..Default::default()
        };
        let config = RotaConfig::from_yaml(ROTA).unwrap();

        let err = create_rota(&api, &config).await.unwrap_err();
        assert!(matches!(err, PlanError::Shift { ref member, .. } if member.name == "Test User 2"));
        assert!(err.to_string().contains("Test User 2 (test2@example.com)"));
        assert_eq!(api.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_with_no_events() {
        let api = FakeCalendar::default();
        let report = cleanup(&api, "cal", Utc::now()).await.unwrap();
        assert_eq!(report, CleanupReport::default());
    }

    #[tokio::test]
    async fn cleanup_continues_past_failed_deletes() {
        let api = FakeCalendar {
            upcoming: vec![
                CalendarEvent::new("a", "Ada on duty"),
                CalendarEvent::new("b", "Bob on duty"),
                CalendarEvent::new("c", "Cy on duty"),
            ],
            fail_delete_for: HashSet::from(["b".to_string()]),
            ..Default::default()
        };

        let report = cleanup(&api, "cal", Utc::now()).await.unwrap();
        assert_eq!(report, CleanupReport { deleted: 2, failed: 1 });
        assert_eq!(*api.deleted.lock().unwrap(), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn cleanup_fails_when_listing_fails() {
        let api = FakeCalendar {
            fail_list: true,
            ..Default::default()
        };
        let err = cleanup(&api, "cal", Utc::now()).await.unwrap_err();
        assert!(matches!(err, PlanError::List(_)));
    }
}
