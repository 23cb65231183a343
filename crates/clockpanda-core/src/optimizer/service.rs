//! Optimization service: builds a problem per user from the calendar and the
//! task list, solves it, and writes the result back.

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calendar::{CalendarEvent, CalendarEventType, CalendarFacade};
use crate::error::{ConfigError, OptimizationError, SolverError, Stage};
use crate::storage::Config;
use crate::task::{PersonalTask, PersonalTaskRepository};
use crate::time::{local_date, local_to_utc, TimeGrain, TimeSpan, GRAIN_LENGTH_MINUTES};
use crate::user::{User, UserPreferences, UserRepository};

use super::constraints::{explain_score, score_problem, ConstraintSummary, ScoringContext};
use super::event::{OptimizerEvent, PersonalTaskOccurrence};
use super::panic_message;
use super::problem::{OptimizationProblem, OptimizationProblemParametrization};
use super::reconcile::{apply_reconciliation, plan_reconciliation, ReconciliationReport};
use super::score::HardMediumSoftScore;
use super::solver::Solver;

/// Local hour personal tasks start at without a preferred time or working hours.
const DEFAULT_TASK_START_HOUR: u32 = 9;

/// Planning knobs the service reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationSettings {
    pub max_range_weeks: u32,
    pub week_start: Weekday,
    pub focus_time_title: String,
    pub focus_time_description: Option<String>,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            max_range_weeks: 2,
            week_start: Weekday::Mon,
            focus_time_title: "Focus Time".to_string(),
            focus_time_description: None,
        }
    }
}

impl OptimizationSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            max_range_weeks: config.optimization.max_range_weeks,
            week_start: config.optimization.week_start_day()?,
            focus_time_title: config.focus_time.title.clone(),
            focus_time_description: Some(config.focus_time.description.clone()).filter(|d| !d.is_empty()),
        })
    }
}

/// A user's solved schedule, ready to be written to the calendar.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub user: User,
    pub parametrization: OptimizationProblemParametrization,
    /// Placed Clock Panda events inside the planning range.
    pub events: Vec<OptimizerEvent>,
    pub score: HardMediumSoftScore,
}

impl OptimizationResult {
    pub fn timezone(&self) -> Tz {
        timezone_of(&self.user)
    }
}

/// Per-user outcome of [`OptimizationService::calculate_optimized_schedule`].
#[derive(Debug)]
pub struct UserOptimization {
    pub email: String,
    pub outcome: Result<OptimizationResult, OptimizationError>,
}

/// Score breakdown of a solved schedule.
#[derive(Debug, Clone, Serialize)]
pub struct UserExplanation {
    pub result: OptimizationResult,
    pub constraints: Vec<ConstraintSummary>,
}

fn timezone_of(user: &User) -> Tz {
    user.preferences
        .as_ref()
        .map(|p| p.timezone)
        .unwrap_or(chrono_tz::UTC)
}

fn calendar_error(email: &str, stage: Stage) -> impl FnOnce(crate::error::CalendarError) -> OptimizationError + '_ {
    move |source| OptimizationError::Calendar {
        email: email.to_string(),
        stage,
        source,
    }
}

pub struct OptimizationService<U, T, C, S> {
    users: U,
    tasks: T,
    calendar: C,
    solver: S,
    settings: OptimizationSettings,
}

impl<U, T, C, S> OptimizationService<U, T, C, S>
where
    U: UserRepository,
    T: PersonalTaskRepository,
    C: CalendarFacade,
    S: Solver,
{
    pub fn new(users: U, tasks: T, calendar: C, solver: S, settings: OptimizationSettings) -> Self {
        Self {
            users,
            tasks,
            calendar,
            solver,
            settings,
        }
    }

    pub fn calendar(&self) -> &C {
        &self.calendar
    }

    pub fn settings(&self) -> &OptimizationSettings {
        &self.settings
    }

    pub fn list_users(&self) -> Result<Vec<User>, OptimizationError> {
        Ok(self.users.list()?)
    }

    /// Solve every user's schedule starting from now.
    pub fn calculate_optimized_schedule(&self) -> Result<Vec<UserOptimization>, OptimizationError> {
        self.calculate_optimized_schedule_at(Utc::now())
    }

    /// Solve every user's schedule for `reference`. Fails as a whole only
    /// when the user list cannot be read; per-user failures are reported in
    /// the returned outcomes.
    pub fn calculate_optimized_schedule_at(
        &self,
        reference: DateTime<Utc>,
    ) -> Result<Vec<UserOptimization>, OptimizationError> {
        let users = self.list_users()?;
        info!(users = users.len(), %reference, "calculating optimized schedules");
        Ok(users
            .into_iter()
            .map(|user| {
                let outcome = self.optimize_user(&user, reference);
                if let Err(error) = &outcome {
                    warn!(email = %user.email, %error, "optimization failed");
                }
                UserOptimization {
                    email: user.email,
                    outcome,
                }
            })
            .collect())
    }

    /// Build, solve and filter one user's schedule.
    pub fn optimize_user(&self, user: &User, reference: DateTime<Utc>) -> Result<OptimizationResult, OptimizationError> {
        let solved = self.solve_user(user, reference)?;
        Ok(result_from(user, solved))
    }

    /// Solve one user's schedule and break its score down by constraint.
    pub fn explain_user(&self, user: &User, reference: DateTime<Utc>) -> Result<UserExplanation, OptimizationError> {
        let solved = self.solve_user(user, reference)?;
        let constraints = explain_score(&solved.schedule, &ScoringContext::new(&solved));
        Ok(UserExplanation {
            result: result_from(user, solved),
            constraints,
        })
    }

    fn solve_user(&self, user: &User, reference: DateTime<Utc>) -> Result<OptimizationProblem, OptimizationError> {
        let problem = self.build_problem(user, reference)?;
        debug!(
            email = %user.email,
            entities = problem.schedule.len(),
            movable = problem.movable_entity_indices().len(),
            "solving"
        );
        let solved = panic::catch_unwind(AssertUnwindSafe(|| self.solver.solve(problem)))
            .unwrap_or_else(|payload| Err(SolverError::Panicked(panic_message(payload.as_ref()))))
            .map_err(|source| OptimizationError::Solver {
                email: user.email.clone(),
                source,
            })?;
        if let Some(score) = solved.score {
            info!(email = %user.email, %score, "solved");
        }
        Ok(solved)
    }

    /// Assemble the problem for `user`: existing events over the
    /// consideration range, one focus-time placeholder per planning day and
    /// one entity per personal-task occurrence.
    pub fn build_problem(&self, user: &User, reference: DateTime<Utc>) -> Result<OptimizationProblem, OptimizationError> {
        let prefs = user
            .preferences
            .as_ref()
            .ok_or_else(|| OptimizationError::MissingPreferences {
                email: user.email.clone(),
            })?;
        let tz = prefs.timezone;
        let parametrization =
            OptimizationProblemParametrization::new(reference, self.settings.max_range_weeks, self.settings.week_start);
        let planning = parametrization.planning_entity_optimization_range();

        let existing = self
            .calendar
            .list_events(user, &parametrization.existing_schedule_consideration_range())
            .map_err(calendar_error(&user.email, Stage::ListEvents))?;
        let tasks = self.tasks.list_by_user_email(&user.email)?;

        let mut schedule = Vec::new();
        let mut task_events = Vec::new();
        for event in existing {
            let span = event.time_span(tz);
            if span.is_empty() {
                continue;
            }
            match event.event_type() {
                CalendarEventType::ExternalEvent => {
                    if event.blocks_time_for(&user.email) {
                        schedule.push(OptimizerEvent::from_calendar_event(&event, &user.email, tz));
                    }
                }
                CalendarEventType::FocusTime => {
                    schedule.push(OptimizerEvent::from_calendar_event(&event, &user.email, tz));
                }
                CalendarEventType::PersonalTask => task_events.push(event),
            }
        }

        schedule.extend(parametrization.planning_dates().into_iter().map(|date| {
            OptimizerEvent::focus_time_placeholder(
                date,
                &user.email,
                &self.settings.focus_time_title,
                self.settings.focus_time_description.as_deref(),
            )
        }));

        let mut claimed = vec![false; task_events.len()];
        let dates = parametrization.planning_dates();
        if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
            let until = last.succ_opt().unwrap_or(*last);
            for task in &tasks {
                for date in task.occurrences(*first, until) {
                    let matching = task_events.iter().enumerate().find(|(i, e)| {
                        !claimed[*i]
                            && e.personal_task_id() == Some(task.id.as_str())
                            && local_date(e.time_span(tz).start, tz) == date
                    });
                    let entity = match matching {
                        Some((i, existing)) => {
                            claimed[i] = true;
                            seeded_task_instance(task, date, &user.email, existing, tz, planning)
                        }
                        None => {
                            let start = initial_task_start(task, date, prefs, planning);
                            OptimizerEvent::personal_task_instance(task, date, &user.email, start)
                        }
                    };
                    schedule.push(entity);
                }
            }
        }

        for (event, used) in task_events.iter().zip(&claimed) {
            if *used {
                continue;
            }
            if event.time_span(tz).start < planning.start {
                schedule.push(OptimizerEvent::from_calendar_event(event, &user.email, tz));
            } else {
                debug!(email = %user.email, event_id = event.id(), "personal task event has no occurrence");
            }
        }

        Ok(OptimizationProblem::new(parametrization, schedule, vec![user.clone()]))
    }

    /// Bring the user's calendar in line with `result`.
    ///
    /// Current Clock Panda events are re-read so changes made since the solve
    /// started are taken into account. Failures of single calendar calls are
    /// collected in the report; only the initial listing aborts.
    pub fn sync_optimized_schedule_with_user_calendar(
        &self,
        result: &OptimizationResult,
    ) -> Result<ReconciliationReport, OptimizationError> {
        let user = &result.user;
        let tz = result.timezone();
        let planning = result.parametrization.planning_entity_optimization_range();
        let current: Vec<CalendarEvent> = self
            .calendar
            .list_events(user, &planning)
            .map_err(calendar_error(&user.email, Stage::Sync))?
            .into_iter()
            .filter(|e| e.event_type().is_owned_by_clock_panda() && planning.contains_instant(e.time_span(tz).start))
            .collect();

        let plan = plan_reconciliation(&current, &result.events, tz);
        debug!(
            email = %user.email,
            deletions = plan.deletions.len(),
            updates = plan.updates.len(),
            creations = plan.creations.len(),
            unchanged = plan.unchanged,
            "reconciliation planned"
        );
        let report = apply_reconciliation(&self.calendar, user, plan);
        info!(
            email = %user.email,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            unchanged = report.unchanged,
            failures = report.failures.len(),
            "calendar synced"
        );
        Ok(report)
    }
}

fn result_from(user: &User, solved: OptimizationProblem) -> OptimizationResult {
    let planning = solved.parametrization.planning_entity_optimization_range();
    let score = solved
        .score
        .unwrap_or_else(|| score_problem(&solved));
    let events = solved
        .schedule
        .iter()
        .filter(|e| {
            !e.is_pinned() && e.is_placed() && !solved.is_frozen(e) && planning.contains_instant(e.start_time())
        })
        .cloned()
        .collect();
    OptimizationResult {
        user: user.clone(),
        parametrization: solved.parametrization,
        events,
        score,
    }
}

/// Entity for a task occurrence that already has a calendar event.
fn seeded_task_instance(
    task: &PersonalTask,
    date: chrono::NaiveDate,
    owner: &str,
    existing: &CalendarEvent,
    tz: Tz,
    planning: TimeSpan,
) -> OptimizerEvent {
    let start = existing.time_span(tz).start;
    if start < planning.start {
        let mut frozen = OptimizerEvent::from_calendar_event(existing, owner, tz);
        frozen.personal_task = Some(PersonalTaskOccurrence {
            task_id: task.id.clone(),
            date,
            preferred_time: task.preferred_time,
        });
        return frozen;
    }
    let mut entity = OptimizerEvent::personal_task_instance(task, date, owner, start);
    entity.original_calendar_event = Some(existing.clone());
    entity
}

/// Where a new task occurrence starts before solving: its preferred time,
/// else the start of working hours, else local 09:00, kept inside the
/// planning range.
fn initial_task_start(
    task: &PersonalTask,
    date: chrono::NaiveDate,
    prefs: &UserPreferences,
    planning: TimeSpan,
) -> DateTime<Utc> {
    let start = task
        .preferred_time
        .map(|range| range.on(date, prefs.timezone).start)
        .or_else(|| prefs.working_hours_on(date).map(|span| span.start))
        .unwrap_or_else(|| {
            let nine = NaiveTime::from_hms_opt(DEFAULT_TASK_START_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
            local_to_utc(date, nine, prefs.timezone)
        });
    let last_grain = TimeGrain::containing(planning.end - Duration::minutes(GRAIN_LENGTH_MINUTES)).start;
    start.clamp(planning.start, last_grain)
}
