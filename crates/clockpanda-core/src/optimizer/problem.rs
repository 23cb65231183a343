//! Planning horizon and the optimization problem handed to the solver.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::time::{utc_midnight, TimeGrain, TimeSpan};
use crate::user::User;

use super::event::OptimizerEvent;
use super::score::HardMediumSoftScore;

/// Days between the reference date and the first plannable day.
const PLANNING_START_OFFSET_DAYS: i64 = 2;

/// Ranges derived once per solve from a reference instant.
///
/// `consideration_start <= planning_start < planning_end == consideration_end`,
/// all at UTC midnight, and both ranges end on a week boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationProblemParametrization {
    planning_entity_optimization_range: TimeSpan,
    existing_schedule_consideration_range: TimeSpan,
}

fn previous_or_same(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let back = (7 + date.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(back))
}

fn next_after(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (7 + weekday.num_days_from_monday() - date.weekday().num_days_from_monday()) % 7;
    date + Duration::days(if ahead == 0 { 7 } else { i64::from(ahead) })
}

impl OptimizationProblemParametrization {
    pub fn new(reference: DateTime<Utc>, max_range_weeks: u32, week_start: Weekday) -> Self {
        assert!(max_range_weeks > 0, "planning range must span at least one week");

        let planning_start = reference.date_naive() + Duration::days(PLANNING_START_OFFSET_DAYS);
        let planning_end = next_after(
            planning_start + Duration::weeks(i64::from(max_range_weeks)),
            week_start,
        );
        let consideration_start = previous_or_same(planning_start, week_start);

        let planning = TimeSpan::new(utc_midnight(planning_start), utc_midnight(planning_end));
        let consideration = TimeSpan::new(utc_midnight(consideration_start), planning.end);
        assert!(
            consideration.start <= planning.start && planning.start < planning.end,
            "malformed optimization range: planning {planning}, consideration {consideration}"
        );

        Self {
            planning_entity_optimization_range: planning,
            existing_schedule_consideration_range: consideration,
        }
    }

    /// Window whose entities the solver may move.
    pub fn planning_entity_optimization_range(&self) -> TimeSpan {
        self.planning_entity_optimization_range
    }

    /// Window whose events are read so weekly aggregation sees whole weeks.
    pub fn existing_schedule_consideration_range(&self) -> TimeSpan {
        self.existing_schedule_consideration_range
    }

    /// Consecutive 7-day spans tiling the consideration range.
    pub fn split_existing_schedule_consideration_range_in_weekly_buckets(&self) -> Vec<TimeSpan> {
        let range = self.existing_schedule_consideration_range;
        let mut buckets = Vec::new();
        let mut cursor = range.start;
        while cursor < range.end {
            let end = (cursor + Duration::weeks(1)).min(range.end);
            buckets.push(TimeSpan::new(cursor, end));
            cursor = end;
        }
        buckets
    }

    /// UTC dates covered by the planning range.
    pub fn planning_dates(&self) -> Vec<NaiveDate> {
        let range = self.planning_entity_optimization_range;
        range
            .start
            .date_naive()
            .iter_days()
            .take_while(|d| utc_midnight(*d) < range.end)
            .collect()
    }

    /// Start grains the solver may choose from.
    pub fn planning_time_grains(&self) -> Vec<TimeGrain> {
        TimeGrain::generate(&self.planning_entity_optimization_range)
    }
}

/// A planning solution: the entities to place plus the context they are
/// scored against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationProblem {
    pub parametrization: OptimizationProblemParametrization,
    pub schedule: Vec<OptimizerEvent>,
    pub users: Vec<User>,
    pub score: Option<HardMediumSoftScore>,
}

impl OptimizationProblem {
    pub fn new(parametrization: OptimizationProblemParametrization, schedule: Vec<OptimizerEvent>, users: Vec<User>) -> Self {
        Self {
            parametrization,
            schedule,
            users,
            score: None,
        }
    }

    /// Existing Clock Panda events that start before the planning range are
    /// context only and must stay where they are.
    pub fn is_frozen(&self, event: &OptimizerEvent) -> bool {
        let planning_start = self.parametrization.planning_entity_optimization_range().start;
        event.original_calendar_event.is_some() && event.start_time() < planning_start
    }

    /// Indices of entities the solver may change.
    pub fn movable_entity_indices(&self) -> Vec<usize> {
        self.schedule
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_pinned() && !self.is_frozen(e))
            .map(|(i, _)| i)
            .collect()
    }
}
