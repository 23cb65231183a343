//! Constraint provider.
//!
//! Each constraint walks the schedule and reports penalised matches into a
//! sink. Scoring sums the matches per band; explaining keeps them.

use std::collections::BTreeMap;

use chrono::{Duration, Timelike};
use chrono_tz::Tz;
use serde::Serialize;

use crate::time::{local_date, local_day_span, TimeSpan};
use crate::user::UserPreferences;

use super::event::OptimizerEvent;
use super::problem::OptimizationProblem;
use super::score::{HardMediumSoftScore, ScoreLevel};

/// Fixed medium penalty for moving an event that already exists.
pub const MOVED_EVENT_PENALTY: i64 = 30;

/// Precomputed lookups shared by every constraint evaluation.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    preferences: BTreeMap<String, UserPreferences>,
    buckets: Vec<TimeSpan>,
}

impl ScoringContext {
    pub fn new(problem: &OptimizationProblem) -> Self {
        Self {
            preferences: problem
                .users
                .iter()
                .filter_map(|u| u.preferences.clone().map(|p| (u.email.clone(), p)))
                .collect(),
            buckets: problem
                .parametrization
                .split_existing_schedule_consideration_range_in_weekly_buckets(),
        }
    }

    fn preferences(&self, email: &str) -> Option<&UserPreferences> {
        self.preferences.get(email)
    }

    fn timezone(&self, email: &str) -> Tz {
        self.preferences(email)
            .map(|p| p.timezone)
            .unwrap_or(chrono_tz::UTC)
    }
}

type Sink<'s, 'e> = dyn FnMut(&[&'e OptimizerEvent], i64) + 's;
type Evaluate = for<'s, 'e> fn(&'e [OptimizerEvent], &ScoringContext, &mut Sink<'s, 'e>);

pub struct Constraint {
    pub name: &'static str,
    pub level: ScoreLevel,
    evaluate: Evaluate,
}

pub static CONSTRAINTS: &[Constraint] = &[
    Constraint {
        name: "Overlapping events",
        level: ScoreLevel::Hard,
        evaluate: overlapping_events,
    },
    Constraint {
        name: "Focus time outside working hours",
        level: ScoreLevel::Hard,
        evaluate: focus_time_outside_working_hours,
    },
    Constraint {
        name: "Focus time spanning multiple days",
        level: ScoreLevel::Hard,
        evaluate: focus_time_spanning_multiple_days,
    },
    Constraint {
        name: "Personal task outside its day",
        level: ScoreLevel::Hard,
        evaluate: personal_task_outside_its_day,
    },
    Constraint {
        name: "Weekly focus time target",
        level: ScoreLevel::Medium,
        evaluate: weekly_focus_time_target,
    },
    Constraint {
        name: "Week without focus time",
        level: ScoreLevel::Medium,
        evaluate: week_without_focus_time,
    },
    Constraint {
        name: "Moved focus time",
        level: ScoreLevel::Medium,
        evaluate: moved_focus_time,
    },
    Constraint {
        name: "Moved personal task",
        level: ScoreLevel::Medium,
        evaluate: moved_personal_task,
    },
    Constraint {
        name: "Focus time outside preferred range",
        level: ScoreLevel::Soft,
        evaluate: focus_time_outside_preferred_range,
    },
    Constraint {
        name: "Focus time not on the hour or half hour",
        level: ScoreLevel::Soft,
        evaluate: focus_time_not_on_half_hour,
    },
    Constraint {
        name: "Personal task outside preferred time",
        level: ScoreLevel::Soft,
        evaluate: personal_task_outside_preferred_time,
    },
];

fn placed_focus_time(schedule: &[OptimizerEvent]) -> impl Iterator<Item = &OptimizerEvent> {
    schedule.iter().filter(|e| e.is_focus_time() && e.is_placed())
}

fn placed_personal_tasks(schedule: &[OptimizerEvent]) -> impl Iterator<Item = &OptimizerEvent> {
    schedule.iter().filter(|e| e.is_personal_task() && e.is_placed())
}

fn overlapping_events<'e>(schedule: &'e [OptimizerEvent], _ctx: &ScoringContext, sink: &mut Sink<'_, 'e>) {
    for (i, a) in schedule.iter().enumerate() {
        if !a.is_placed() {
            continue;
        }
        for b in &schedule[i + 1..] {
            if !b.is_placed() || (a.is_pinned() && b.is_pinned()) || a.owner != b.owner {
                continue;
            }
            let minutes = a.compute_overlap_in_minutes(b);
            if minutes > 0 {
                sink(&[a, b], minutes);
            }
        }
    }
}

fn focus_time_outside_working_hours<'e>(
    schedule: &'e [OptimizerEvent],
    ctx: &ScoringContext,
    sink: &mut Sink<'_, 'e>,
) {
    for event in placed_focus_time(schedule) {
        let Some(prefs) = ctx.preferences(&event.owner) else {
            continue;
        };
        let date = local_date(event.start_time(), prefs.timezone);
        if let Some(hours) = prefs.working_hours_on(date) {
            let minutes = event.compute_outside_range_in_minutes(&hours);
            if minutes > 0 {
                sink(&[event], minutes);
            }
        }
    }
}

fn focus_time_spanning_multiple_days<'e>(
    schedule: &'e [OptimizerEvent],
    ctx: &ScoringContext,
    sink: &mut Sink<'_, 'e>,
) {
    for event in placed_focus_time(schedule) {
        let tz = ctx.timezone(&event.owner);
        let start_day = local_date(event.start_time(), tz);
        let end_day = local_date(event.end_time() - Duration::seconds(1), tz);
        if start_day != end_day {
            sink(&[event], 1);
        }
    }
}

fn personal_task_outside_its_day<'e>(schedule: &'e [OptimizerEvent], ctx: &ScoringContext, sink: &mut Sink<'_, 'e>) {
    for event in placed_personal_tasks(schedule) {
        let Some(occurrence) = &event.personal_task else {
            continue;
        };
        let day = local_day_span(occurrence.date, ctx.timezone(&event.owner));
        let minutes = event.compute_outside_range_in_minutes(&day);
        if minutes > 0 {
            sink(&[event], minutes);
        }
    }
}

/// Placed focus time of `email` starting inside `bucket`.
fn focus_time_in_bucket<'e: 'a, 'a>(
    schedule: &'e [OptimizerEvent],
    email: &'a str,
    bucket: &'a TimeSpan,
) -> impl Iterator<Item = &'e OptimizerEvent> + 'a {
    placed_focus_time(schedule).filter(move |e| e.owner == email && bucket.contains_instant(e.start_time()))
}

fn weekly_focus_time_target<'e>(schedule: &'e [OptimizerEvent], ctx: &ScoringContext, sink: &mut Sink<'_, 'e>) {
    for (email, prefs) in &ctx.preferences {
        let target = prefs.target_focus_time_minutes_per_week();
        for bucket in &ctx.buckets {
            let events: Vec<&OptimizerEvent> = focus_time_in_bucket(schedule, email, bucket).collect();
            if events.is_empty() {
                continue;
            }
            let scheduled: i64 = events.iter().map(|e| e.duration_in_minutes()).sum();
            let diff = (scheduled - target).abs();
            if diff > 0 {
                sink(&events, diff);
            }
        }
    }
}

fn week_without_focus_time<'e>(schedule: &'e [OptimizerEvent], ctx: &ScoringContext, sink: &mut Sink<'_, 'e>) {
    for (email, prefs) in &ctx.preferences {
        let target = prefs.target_focus_time_minutes_per_week();
        if target == 0 {
            continue;
        }
        for bucket in &ctx.buckets {
            if focus_time_in_bucket(schedule, email, bucket).next().is_none() {
                sink(&[], target);
            }
        }
    }
}

fn moved_focus_time<'e>(schedule: &'e [OptimizerEvent], ctx: &ScoringContext, sink: &mut Sink<'_, 'e>) {
    for event in schedule.iter().filter(|e| e.is_focus_time()) {
        if event.has_changed_from_original(ctx.timezone(&event.owner)) {
            sink(&[event], MOVED_EVENT_PENALTY);
        }
    }
}

fn moved_personal_task<'e>(schedule: &'e [OptimizerEvent], ctx: &ScoringContext, sink: &mut Sink<'_, 'e>) {
    for event in schedule.iter().filter(|e| e.is_personal_task()) {
        if event.has_changed_from_original(ctx.timezone(&event.owner)) {
            sink(&[event], MOVED_EVENT_PENALTY);
        }
    }
}

fn focus_time_outside_preferred_range<'e>(
    schedule: &'e [OptimizerEvent],
    ctx: &ScoringContext,
    sink: &mut Sink<'_, 'e>,
) {
    for event in placed_focus_time(schedule) {
        let Some(prefs) = ctx.preferences(&event.owner) else {
            continue;
        };
        let Some(range) = prefs.preferred_focus_time_range else {
            continue;
        };
        let date = local_date(event.start_time(), prefs.timezone);
        let minutes = event.compute_outside_range_in_minutes(&range.on(date, prefs.timezone));
        if minutes > 0 {
            sink(&[event], minutes);
        }
    }
}

fn focus_time_not_on_half_hour<'e>(schedule: &'e [OptimizerEvent], ctx: &ScoringContext, sink: &mut Sink<'_, 'e>) {
    for event in placed_focus_time(schedule) {
        let local = event.start_time().with_timezone(&ctx.timezone(&event.owner));
        if local.minute() % 30 != 0 {
            sink(&[event], 1);
        }
    }
}

fn personal_task_outside_preferred_time<'e>(
    schedule: &'e [OptimizerEvent],
    ctx: &ScoringContext,
    sink: &mut Sink<'_, 'e>,
) {
    for event in placed_personal_tasks(schedule) {
        let Some(occurrence) = &event.personal_task else {
            continue;
        };
        let Some(range) = occurrence.preferred_time else {
            continue;
        };
        let window = range.on(occurrence.date, ctx.timezone(&event.owner));
        let minutes = event.compute_outside_range_in_minutes(&window);
        if minutes > 0 {
            sink(&[event], minutes);
        }
    }
}

/// Score `schedule` against every constraint.
pub fn calculate_score(schedule: &[OptimizerEvent], ctx: &ScoringContext) -> HardMediumSoftScore {
    let mut score = HardMediumSoftScore::ZERO;
    for constraint in CONSTRAINTS {
        let mut total = 0i64;
        (constraint.evaluate)(schedule, ctx, &mut |_, penalty| total += penalty);
        score += HardMediumSoftScore::penalty(constraint.level, total);
    }
    score
}

/// Convenience for scoring a whole problem once.
pub fn score_problem(problem: &OptimizationProblem) -> HardMediumSoftScore {
    calculate_score(&problem.schedule, &ScoringContext::new(problem))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintMatch {
    pub event_ids: Vec<String>,
    pub penalty: i64,
}

/// Per-constraint breakdown of a score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintSummary {
    pub name: &'static str,
    pub level: ScoreLevel,
    pub total_penalty: i64,
    pub matches: Vec<ConstraintMatch>,
}

/// Break the score of `schedule` down by constraint. Constraints without
/// matches are left out.
pub fn explain_score(schedule: &[OptimizerEvent], ctx: &ScoringContext) -> Vec<ConstraintSummary> {
    CONSTRAINTS
        .iter()
        .filter_map(|constraint| {
            let mut matches = Vec::new();
            (constraint.evaluate)(schedule, ctx, &mut |events, penalty| {
                matches.push(ConstraintMatch {
                    event_ids: events.iter().map(|e| e.id.clone()).collect(),
                    penalty,
                })
            });
            if matches.is_empty() {
                return None;
            }
            Some(ConstraintSummary {
                name: constraint.name,
                level: constraint.level,
                total_penalty: matches.iter().map(|m| m.penalty).sum(),
                matches,
            })
        })
        .collect()
}
