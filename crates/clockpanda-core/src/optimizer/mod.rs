//! Focus-time optimization.
//!
//! Entities ([`OptimizerEvent`]) are placed on a 15-minute grid over the
//! planning range of an [`OptimizationProblemParametrization`], scored by
//! the constraint table in [`constraints`] and improved by a [`Solver`].
//! [`OptimizationService`] wires that to users, tasks and the calendar;
//! [`OptimizationCronJob`] runs it periodically.

pub mod constraints;
pub mod cron;
pub mod event;
pub mod problem;
pub mod reconcile;
pub mod score;
pub mod service;
pub mod solver;

#[cfg(test)]
mod reconcile_tests;

pub use constraints::{calculate_score, explain_score, score_problem, ConstraintMatch, ConstraintSummary, ScoringContext};
pub use cron::{CronFailure, CronRunSummary, OptimizationCronJob, ScheduleOptimizer};
pub use event::{OptimizerEvent, PersonalTaskOccurrence, FOCUS_TIME_DURATION_GRAINS};
pub use problem::{OptimizationProblem, OptimizationProblemParametrization};
pub use reconcile::{
    apply_reconciliation, plan_reconciliation, Operation, ReconciliationFailure, ReconciliationPlan,
    ReconciliationReport,
};
pub use score::{HardMediumSoftScore, ScoreLevel};
pub use service::{OptimizationResult, OptimizationService, OptimizationSettings, UserExplanation, UserOptimization};
pub use solver::{LateAcceptanceSolver, Solver, SolverConfig};

use std::any::Any;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
