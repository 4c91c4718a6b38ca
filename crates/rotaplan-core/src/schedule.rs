//! Shift schedule computation.
//!
//! Every member gets one recurring all-day event. Member `i` (in file
//! order) starts `i * shiftDuration` weeks after the rota start date, and
//! the event repeats once the whole rota has cycled.

use chrono::{Duration, NaiveDate};

use crate::event::{Attendee, EventAttachment, EventDate, EventDraft, TRANSPARENT};
use crate::rota::{Member, RotaConfig, RotaError};

/// One member's first shift and its recurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    pub member: Member,
    /// First day of the first shift.
    pub start: NaiveDate,
    /// Day after the last day of the first shift (exclusive).
    pub end: NaiveDate,
    /// Weeks between two shifts of the same member.
    pub interval_weeks: u32,
}

impl Shift {
    /// Returns the iCalendar recurrence rule for this shift.
    pub fn rrule(&self) -> String {
        format!("RRULE:FREQ=WEEKLY;INTERVAL={}", self.interval_weeks)
    }
}

/// Computes the first shift of every member.
///
/// Fails when a shift would end past the supported date range.
pub fn plan_shifts(config: &RotaConfig) -> Result<Vec<Shift>, RotaError> {
    let weeks = i64::from(config.shift_duration);
    let interval_weeks = config
        .shift_duration
        .saturating_mul(u32::try_from(config.members.len()).unwrap_or(u32::MAX));

    config
        .members
        .iter()
        .enumerate()
        .map(|(index, member)| {
            let out_of_range = || {
                RotaError::invalid(format!(
                    "shift of {} is past the supported date range",
                    member.name
                ))
            };
            let start = i64::try_from(index)
                .ok()
                .and_then(|index| index.checked_mul(weeks))
                .and_then(|offset| weeks_after(config.start_date, offset))
                .ok_or_else(out_of_range)?;
            let end = weeks_after(start, weeks).ok_or_else(out_of_range)?;
            Ok(Shift {
                member: member.clone(),
                start,
                end,
                interval_weeks,
            })
        })
        .collect()
}

/// Returns `date` moved forward by `weeks`, or `None` when out of range.
pub(crate) fn weeks_after(date: NaiveDate, weeks: i64) -> Option<NaiveDate> {
    Duration::try_weeks(weeks).and_then(|offset| date.checked_add_signed(offset))
}

/// Builds the event for a shift.
pub fn build_event(config: &RotaConfig, shift: &Shift) -> Result<EventDraft, RotaError> {
    let title = config.title_template()?;
    let boundary = |date| EventDate {
        date,
        time_zone: config.time_zone.clone(),
    };

    Ok(EventDraft {
        summary: title.render(&shift.member),
        description: config.description.clone(),
        start: boundary(shift.start),
        end: boundary(shift.end),
        recurrence: vec![shift.rrule()],
        attendees: vec![Attendee {
            email: shift.member.email.clone(),
            display_name: shift.member.name.clone(),
        }],
        transparency: TRANSPARENT.to_string(),
        attachments: config
            .attachments
            .iter()
            .map(|a| EventAttachment {
                file_url: a.url.clone(),
                title: a.name.clone(),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(shift_duration: u32, members: usize) -> RotaConfig {
        let members: String = (1..=members)
            .map(|i| format!("  - name: User {i}\n    email: user{i}@example.com\n"))
            .collect();
        RotaConfig::from_yaml(&format!(
            "startDate: 2024-11-03\ncalendarID: cal\nshiftDuration: {shift_duration}\ndescription: on call\nmembers:\n{members}"
        ))
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_shifts_follow_member_order() {
        let shifts = plan_shifts(&config(1, 3)).unwrap();
        assert_eq!(shifts.len(), 3);
        assert_eq!(shifts[0].start, date(2024, 11, 3));
        assert_eq!(shifts[0].end, date(2024, 11, 10));
        assert_eq!(shifts[1].start, date(2024, 11, 10));
        assert_eq!(shifts[2].start, date(2024, 11, 17));
        assert_eq!(shifts[2].end, date(2024, 11, 24));
        assert_eq!(shifts[2].member.name, "User 3");
    }

    #[test]
    fn multi_week_shifts_recur_after_full_cycle() {
        let shifts = plan_shifts(&config(2, 2)).unwrap();
        assert_eq!(shifts[1].start, date(2024, 11, 17));
        assert_eq!(shifts[1].end, date(2024, 12, 1));
        insta::assert_snapshot!(shifts[0].rrule(), @"RRULE:FREQ=WEEKLY;INTERVAL=4");
    }

    #[test]
    fn event_for_shift() {
        let config = config(1, 2);
        let shifts = plan_shifts(&config).unwrap();
        let event = build_event(&config, &shifts[1]).unwrap();

        assert_eq!(event.summary, "User 2 on duty");
        assert_eq!(event.description.as_deref(), Some("on call"));
        assert_eq!(event.start.date, date(2024, 11, 10));
        assert_eq!(event.end.date, date(2024, 11, 17));
        assert_eq!(event.start.time_zone, "UTC");
        assert_eq!(event.recurrence, vec!["RRULE:FREQ=WEEKLY;INTERVAL=2".to_string()]);
        assert_eq!(event.attendees[0].email, "user2@example.com");
        assert_eq!(event.attendees[0].display_name, "User 2");
        assert_eq!(event.transparency, "transparent");
        assert!(event.attachments.is_empty());
    }

    #[test]
    fn shifts_past_the_date_range_are_rejected() {
        let mut config = config(1, 2);
        config.shift_duration = 100_000_000;
        let err = plan_shifts(&config).unwrap_err();
        assert!(matches!(err, RotaError::Invalid(_)));
        assert!(err.to_string().contains("User 1"));
    }
}
