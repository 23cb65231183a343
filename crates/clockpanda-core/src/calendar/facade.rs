//! The calendar provider boundary.

use std::sync::Arc;

use crate::error::CalendarError;
use crate::time::TimeSpan;
use crate::user::User;

use super::{CalendarEvent, CalendarEventType};

/// Payload for an event Clock Panda writes to a calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCalendarEvent {
    pub title: String,
    pub description: Option<String>,
    pub span: TimeSpan,
    pub event_type: CalendarEventType,
    pub personal_task_id: Option<String>,
}

/// Operations the planner needs from a calendar provider.
///
/// Implementations are blocking. `list_events` must return every page.
/// `update_event` and `delete_event` must refuse events of type
/// [`CalendarEventType::ExternalEvent`] before talking to the provider.
pub trait CalendarFacade: Send + Sync {
    fn list_events(&self, user: &User, range: &TimeSpan) -> Result<Vec<CalendarEvent>, CalendarError>;

    fn create_event(&self, user: &User, event: &NewCalendarEvent) -> Result<CalendarEvent, CalendarError>;

    fn update_event(
        &self,
        user: &User,
        existing: &CalendarEvent,
        event: &NewCalendarEvent,
    ) -> Result<CalendarEvent, CalendarError>;

    fn delete_event(&self, user: &User, event: &CalendarEvent) -> Result<(), CalendarError>;
}

impl<T: CalendarFacade + ?Sized> CalendarFacade for Arc<T> {
    fn list_events(&self, user: &User, range: &TimeSpan) -> Result<Vec<CalendarEvent>, CalendarError> {
        (**self).list_events(user, range)
    }

    fn create_event(&self, user: &User, event: &NewCalendarEvent) -> Result<CalendarEvent, CalendarError> {
        (**self).create_event(user, event)
    }

    fn update_event(
        &self,
        user: &User,
        existing: &CalendarEvent,
        event: &NewCalendarEvent,
    ) -> Result<CalendarEvent, CalendarError> {
        (**self).update_event(user, existing, event)
    }

    fn delete_event(&self, user: &User, event: &CalendarEvent) -> Result<(), CalendarError> {
        (**self).delete_event(user, event)
    }
}

/// Reject modifications of events Clock Panda does not own.
pub fn ensure_modifiable(event: &CalendarEvent) -> Result<(), CalendarError> {
    if event.event_type().is_owned_by_clock_panda() {
        Ok(())
    } else {
        Err(CalendarError::ExternalEventNotModifiable {
            event_id: event.id().to_string(),
        })
    }
}
