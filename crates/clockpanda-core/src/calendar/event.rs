//! Calendar events as read from the provider.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::time::{local_day_span, TimeSpan};

/// Who created an event, as far as planning is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarEventType {
    FocusTime,
    ExternalEvent,
    PersonalTask,
}

impl CalendarEventType {
    /// Events Clock Panda created and may therefore move or delete.
    pub fn is_owned_by_clock_panda(&self) -> bool {
        !matches!(self, CalendarEventType::ExternalEvent)
    }

    /// Marker written into provider metadata.
    pub fn as_marker(&self) -> &'static str {
        match self {
            CalendarEventType::FocusTime => "FOCUS_TIME",
            CalendarEventType::ExternalEvent => "EXTERNAL_EVENT",
            CalendarEventType::PersonalTask => "PERSONAL_TASK",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "FOCUS_TIME" => Some(CalendarEventType::FocusTime),
            "EXTERNAL_EVENT" => Some(CalendarEventType::ExternalEvent),
            "PERSONAL_TASK" => Some(CalendarEventType::PersonalTask),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttendeeStatus {
    NeedsAction,
    Declined,
    Tentative,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    pub status: AttendeeStatus,
}

/// Attributes shared by both event variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub ical_uid: Option<String>,
    pub is_recurring: bool,
    pub owner: String,
    pub busy: bool,
    pub event_type: CalendarEventType,
    pub personal_task_id: Option<String>,
    pub attendees: Vec<Attendee>,
}

/// An event with precise timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantCalendarEvent {
    #[serde(flatten)]
    pub details: EventDetails,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// An all-day event. `end_date` is exclusive, as providers report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDateCalendarEvent {
    #[serde(flatten)]
    pub details: EventDetails,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarEvent {
    Instant(InstantCalendarEvent),
    LocalDate(LocalDateCalendarEvent),
}

impl CalendarEvent {
    pub fn details(&self) -> &EventDetails {
        match self {
            CalendarEvent::Instant(e) => &e.details,
            CalendarEvent::LocalDate(e) => &e.details,
        }
    }

    pub fn id(&self) -> &str {
        &self.details().id
    }

    pub fn title(&self) -> &str {
        &self.details().title
    }

    pub fn description(&self) -> Option<&str> {
        self.details().description.as_deref()
    }

    pub fn event_type(&self) -> CalendarEventType {
        self.details().event_type
    }

    pub fn personal_task_id(&self) -> Option<&str> {
        self.details().personal_task_id.as_deref()
    }

    /// Concrete span in `tz`. All-day events run from local midnight of the
    /// start date to local midnight of the (exclusive) end date.
    pub fn time_span(&self, tz: Tz) -> TimeSpan {
        match self {
            CalendarEvent::Instant(e) => TimeSpan::new(e.start, e.end.max(e.start)),
            CalendarEvent::LocalDate(e) => {
                let start = local_day_span(e.start_date, tz).start;
                let end = local_day_span(e.end_date, tz).start;
                TimeSpan::new(start, end.max(start))
            }
        }
    }

    pub fn duration_minutes(&self, tz: Tz) -> i64 {
        self.time_span(tz).duration_minutes()
    }

    /// Whether `email` declined this event.
    pub fn declined_by(&self, email: &str) -> bool {
        self.details()
            .attendees
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(email) && a.status == AttendeeStatus::Declined)
    }

    /// Whether this event should keep its owner from working on anything else.
    pub fn blocks_time_for(&self, email: &str) -> bool {
        self.details().busy && !self.declined_by(email)
    }
}
