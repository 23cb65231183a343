//! In-process calendar used for dry runs and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::CalendarError;
use crate::time::TimeSpan;
use crate::user::User;

use super::facade::{ensure_modifiable, CalendarFacade, NewCalendarEvent};
use super::{CalendarEvent, EventDetails, InstantCalendarEvent};

/// A mutation applied through the facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Created { email: String, event_id: String },
    Updated { email: String, event_id: String },
    Deleted { email: String, event_id: String },
}

#[derive(Default)]
struct State {
    events: HashMap<String, Vec<CalendarEvent>>,
    mutations: Vec<Mutation>,
    failing_lists: HashSet<String>,
    failing_events: HashSet<String>,
    fail_creates: bool,
}

/// Calendar facade backed by a map of user email to events.
#[derive(Default)]
pub struct InMemoryCalendarFacade {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl InMemoryCalendarFacade {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an event into a user's calendar without recording a mutation.
    pub fn insert(&self, email: &str, event: CalendarEvent) {
        self.state()
            .events
            .entry(email.to_string())
            .or_default()
            .push(event);
    }

    pub fn events(&self, email: &str) -> Vec<CalendarEvent> {
        self.state().events.get(email).cloned().unwrap_or_default()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state().mutations.clear();
    }

    /// Make `list_events` fail for `email`.
    pub fn fail_listing_for(&self, email: &str) {
        self.state().failing_lists.insert(email.to_string());
    }

    /// Make updates and deletes of `event_id` fail.
    pub fn fail_mutations_of(&self, event_id: &str) {
        self.state().failing_events.insert(event_id.to_string());
    }

    pub fn fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    fn to_event(&self, id: String, user: &User, event: &NewCalendarEvent) -> CalendarEvent {
        CalendarEvent::Instant(InstantCalendarEvent {
            details: EventDetails {
                id,
                title: event.title.clone(),
                description: event.description.clone(),
                ical_uid: None,
                is_recurring: false,
                owner: user.email.clone(),
                busy: true,
                event_type: event.event_type,
                personal_task_id: event.personal_task_id.clone(),
                attendees: Vec::new(),
            },
            start: event.span.start,
            end: event.span.end,
        })
    }
}

fn injected_failure(what: &str) -> CalendarError {
    CalendarError::Api {
        status: 500,
        message: format!("injected failure: {what}"),
    }
}

impl CalendarFacade for InMemoryCalendarFacade {
    fn list_events(&self, user: &User, range: &TimeSpan) -> Result<Vec<CalendarEvent>, CalendarError> {
        let state = self.state();
        if state.failing_lists.contains(&user.email) {
            return Err(injected_failure("list"));
        }
        let tz = user
            .preferences
            .as_ref()
            .map(|p| p.timezone)
            .unwrap_or(chrono_tz::UTC);
        Ok(state
            .events
            .get(&user.email)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.time_span(tz).overlaps(range))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_event(&self, user: &User, event: &NewCalendarEvent) -> Result<CalendarEvent, CalendarError> {
        if self.state().fail_creates {
            return Err(injected_failure("create"));
        }
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let created = self.to_event(id.clone(), user, event);
        let mut state = self.state();
        state
            .events
            .entry(user.email.clone())
            .or_default()
            .push(created.clone());
        state.mutations.push(Mutation::Created {
            email: user.email.clone(),
            event_id: id,
        });
        Ok(created)
    }

    fn update_event(
        &self,
        user: &User,
        existing: &CalendarEvent,
        event: &NewCalendarEvent,
    ) -> Result<CalendarEvent, CalendarError> {
        ensure_modifiable(existing)?;
        let updated = self.to_event(existing.id().to_string(), user, event);
        let mut state = self.state();
        if state.failing_events.contains(existing.id()) {
            return Err(injected_failure("update"));
        }
        let slot = state
            .events
            .get_mut(&user.email)
            .and_then(|events| events.iter_mut().find(|e| e.id() == existing.id()))
            .ok_or_else(|| CalendarError::NotFound {
                event_id: existing.id().to_string(),
            })?;
        *slot = updated.clone();
        state.mutations.push(Mutation::Updated {
            email: user.email.clone(),
            event_id: existing.id().to_string(),
        });
        Ok(updated)
    }

    fn delete_event(&self, user: &User, event: &CalendarEvent) -> Result<(), CalendarError> {
        ensure_modifiable(event)?;
        let mut state = self.state();
        if state.failing_events.contains(event.id()) {
            return Err(injected_failure("delete"));
        }
        if let Some(events) = state.events.get_mut(&user.email) {
            events.retain(|e| e.id() != event.id());
        }
        state.mutations.push(Mutation::Deleted {
            email: user.email.clone(),
            event_id: event.id().to_string(),
        });
        Ok(())
    }
}
