//! Calendar reconciliation.
//!
//! Planning diffs the events Clock Panda currently owns in the calendar
//! against a solved schedule; applying pushes the diff through a
//! [`CalendarFacade`], one independent call per event.

use std::collections::HashSet;

use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

use crate::calendar::{CalendarEvent, CalendarFacade, NewCalendarEvent};
use crate::error::CalendarError;
use crate::user::User;

use super::event::OptimizerEvent;

/// Calendar operation kind, used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// Mutations needed to bring a calendar in line with a solved schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub deletions: Vec<CalendarEvent>,
    pub updates: Vec<(CalendarEvent, NewCalendarEvent)>,
    pub creations: Vec<NewCalendarEvent>,
    pub unchanged: usize,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.updates.is_empty() && self.creations.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.deletions.len() + self.updates.len() + self.creations.len()
    }
}

#[derive(Debug)]
pub struct ReconciliationFailure {
    pub operation: Operation,
    /// Provider id for updates and deletes, the event title for creations.
    pub event_id: String,
    pub error: CalendarError,
}

/// Outcome of applying a [`ReconciliationPlan`].
#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failures: Vec<ReconciliationFailure>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Calendar payload for a solved entity.
pub fn to_new_calendar_event(event: &OptimizerEvent) -> NewCalendarEvent {
    NewCalendarEvent {
        title: event.title.clone(),
        description: event.description.clone(),
        span: event.time_span(),
        event_type: event.event_type,
        personal_task_id: event.personal_task.as_ref().map(|p| p.task_id.clone()),
    }
}

fn same_placement(current: &CalendarEvent, wanted: &NewCalendarEvent, tz: Tz) -> bool {
    current.event_type() == wanted.event_type
        && current.time_span(tz) == wanted.span
        && current.personal_task_id() == wanted.personal_task_id.as_deref()
}

/// Title and description as shown in the calendar. A missing and an empty
/// description are the same.
fn same_content(current: &CalendarEvent, wanted: &NewCalendarEvent) -> bool {
    current.title() == wanted.title
        && current.description().unwrap_or_default() == wanted.description.as_deref().unwrap_or_default()
}

/// Diff `current` calendar events against `solved` entities.
///
/// Solved entities match the current event they were seeded from by id.
/// Entities without a live original adopt an unmatched current event with
/// the same type, span and task link, so a repeated run makes no calls.
/// A matched event is updated when its span, title or description differs.
/// Whatever current event stays unmatched is deleted.
///
/// # Panics
///
/// When `current` contains an event Clock Panda does not own.
pub fn plan_reconciliation(current: &[CalendarEvent], solved: &[OptimizerEvent], tz: Tz) -> ReconciliationPlan {
    for event in current {
        assert!(
            event.event_type().is_owned_by_clock_panda(),
            "reconciliation was handed external event {}",
            event.id()
        );
    }

    let mut plan = ReconciliationPlan::default();
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut pending = Vec::new();

    for event in solved {
        let wanted = to_new_calendar_event(event);
        let original = event
            .original_calendar_event
            .as_ref()
            .and_then(|o| current.iter().find(|c| c.id() == o.id()))
            .filter(|c| !claimed.contains(c.id()));
        match original {
            Some(existing) => {
                claimed.insert(existing.id());
                if existing.time_span(tz) == wanted.span && same_content(existing, &wanted) {
                    plan.unchanged += 1;
                } else {
                    plan.updates.push((existing.clone(), wanted));
                }
            }
            None => pending.push(wanted),
        }
    }

    for wanted in pending {
        let twin = current
            .iter()
            .find(|c| !claimed.contains(c.id()) && same_placement(c, &wanted, tz));
        match twin {
            Some(existing) => {
                claimed.insert(existing.id());
                if same_content(existing, &wanted) {
                    plan.unchanged += 1;
                } else {
                    plan.updates.push((existing.clone(), wanted));
                }
            }
            None => plan.creations.push(wanted),
        }
    }

    plan.deletions = current
        .iter()
        .filter(|c| !claimed.contains(c.id()))
        .cloned()
        .collect();
    plan
}

/// Apply `plan` for `user`: deletions first, then updates, then creations.
/// A failing call is recorded and the remaining calls still run.
pub fn apply_reconciliation<C: CalendarFacade + ?Sized>(
    calendar: &C,
    user: &User,
    plan: ReconciliationPlan,
) -> ReconciliationReport {
    let mut report = ReconciliationReport {
        unchanged: plan.unchanged,
        ..ReconciliationReport::default()
    };

    for event in plan.deletions {
        match calendar.delete_event(user, &event) {
            Ok(()) => report.deleted += 1,
            Err(CalendarError::NotFound { event_id }) => {
                debug!(email = %user.email, event_id, "event already gone");
                report.deleted += 1;
            }
            Err(error) => {
                warn!(email = %user.email, event_id = event.id(), %error, "delete failed");
                report.failures.push(ReconciliationFailure {
                    operation: Operation::Delete,
                    event_id: event.id().to_string(),
                    error,
                });
            }
        }
    }

    for (existing, wanted) in plan.updates {
        match calendar.update_event(user, &existing, &wanted) {
            Ok(_) => report.updated += 1,
            Err(error) => {
                warn!(email = %user.email, event_id = existing.id(), %error, "update failed");
                report.failures.push(ReconciliationFailure {
                    operation: Operation::Update,
                    event_id: existing.id().to_string(),
                    error,
                });
            }
        }
    }

    for wanted in plan.creations {
        match calendar.create_event(user, &wanted) {
            Ok(created) => {
                debug!(email = %user.email, event_id = created.id(), span = %wanted.span, "created");
                report.created += 1;
            }
            Err(error) => {
                warn!(email = %user.email, title = %wanted.title, %error, "create failed");
                report.failures.push(ReconciliationFailure {
                    operation: Operation::Create,
                    event_id: wanted.title.clone(),
                    error,
                });
            }
        }
    }

    report
}
