//! The planning entity the solver moves around.

use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarEvent, CalendarEventType};
use crate::task::PersonalTask;
use crate::time::{
    compute_outside_range_in_minutes, compute_overlap_in_minutes, grains_for_minutes, LocalTimeRange, TimeGrain,
    TimeSpan, GRAIN_LENGTH_MINUTES,
};

/// Grains a placed focus-time block may last: two to six hours.
pub const FOCUS_TIME_DURATION_GRAINS: RangeInclusive<u32> = 8..=24;

/// Link from a personal-task entity back to the task occurrence it plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalTaskOccurrence {
    pub task_id: String,
    /// Local date the task occurs on.
    pub date: NaiveDate,
    pub preferred_time: Option<LocalTimeRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerEvent {
    /// Provider id for events seeded from the calendar, synthetic otherwise.
    pub id: String,
    pub event_type: CalendarEventType,
    pub title: String,
    pub description: Option<String>,
    pub owner: String,
    pub start_time_grain: TimeGrain,
    /// Zero means the event is not placed.
    pub duration_in_time_grains: u32,
    pub original_calendar_event: Option<CalendarEvent>,
    pub personal_task: Option<PersonalTaskOccurrence>,
}

impl OptimizerEvent {
    /// Map an event read from the calendar. The start snaps down to the grain
    /// grid and the duration rounds up so the whole event stays covered.
    pub fn from_calendar_event(event: &CalendarEvent, owner: &str, tz: Tz) -> Self {
        let span = event.time_span(tz);
        let start = TimeGrain::containing(span.start);
        let duration = grains_for_minutes((span.end - start.start).num_minutes());
        Self {
            id: event.id().to_string(),
            event_type: event.event_type(),
            title: event.title().to_string(),
            description: event.details().description.clone(),
            owner: owner.to_string(),
            start_time_grain: start,
            duration_in_time_grains: duration,
            original_calendar_event: Some(event.clone()),
            personal_task: None,
        }
    }

    /// A not-yet-placed focus-time slot for `date`.
    pub fn focus_time_placeholder(date: NaiveDate, owner: &str, title: &str, description: Option<&str>) -> Self {
        Self {
            id: format!("focus-time-{date}"),
            event_type: CalendarEventType::FocusTime,
            title: title.to_string(),
            description: description.map(str::to_string),
            owner: owner.to_string(),
            start_time_grain: TimeGrain::new(crate::time::utc_midnight(date)),
            duration_in_time_grains: 0,
            original_calendar_event: None,
            personal_task: None,
        }
    }

    /// One occurrence of a personal task, starting on the grain containing
    /// `initial_start`. Its duration is fixed by the task.
    pub fn personal_task_instance(
        task: &PersonalTask,
        date: NaiveDate,
        owner: &str,
        initial_start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("personal-task-{}-{date}", task.id),
            event_type: CalendarEventType::PersonalTask,
            title: task.title.clone(),
            description: task.description.clone(),
            owner: owner.to_string(),
            start_time_grain: TimeGrain::containing(initial_start),
            duration_in_time_grains: grains_for_minutes(i64::from(task.duration_minutes)),
            original_calendar_event: None,
            personal_task: Some(PersonalTaskOccurrence {
                task_id: task.id.clone(),
                date,
                preferred_time: task.preferred_time,
            }),
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.event_type == CalendarEventType::ExternalEvent
    }

    pub fn is_focus_time(&self) -> bool {
        self.event_type == CalendarEventType::FocusTime
    }

    pub fn is_personal_task(&self) -> bool {
        self.event_type == CalendarEventType::PersonalTask
    }

    pub fn is_placed(&self) -> bool {
        self.duration_in_time_grains > 0
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time_grain.start
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time_grain
            .offset(i64::from(self.duration_in_time_grains))
            .start
    }

    pub fn duration_in_minutes(&self) -> i64 {
        i64::from(self.duration_in_time_grains) * GRAIN_LENGTH_MINUTES
    }

    pub fn time_span(&self) -> TimeSpan {
        TimeSpan::new(self.start_time(), self.end_time())
    }

    /// Whether the planned span differs from the calendar event it came from.
    /// Entities without an original never count as changed.
    pub fn has_changed_from_original(&self, tz: Tz) -> bool {
        self.original_calendar_event
            .as_ref()
            .is_some_and(|original| original.time_span(tz) != self.time_span())
    }

    pub fn compute_overlap_in_minutes(&self, other: &OptimizerEvent) -> i64 {
        compute_overlap_in_minutes(&self.time_span(), &other.time_span())
    }

    pub fn compute_outside_range_in_minutes(&self, range: &TimeSpan) -> i64 {
        compute_outside_range_in_minutes(&self.time_span(), range)
    }

    /// Durations the solver may assign. Only focus time has a variable
    /// duration; asking for any other type is a bug.
    pub fn duration_range(&self) -> Vec<u32> {
        assert!(
            self.is_focus_time(),
            "duration range requested for {:?} event {}",
            self.event_type,
            self.id
        );
        std::iter::once(0).chain(FOCUS_TIME_DURATION_GRAINS).collect()
    }
}
