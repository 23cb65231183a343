//! Local-search solver.
//!
//! [`LateAcceptanceSolver`] runs late-acceptance hill climbing over the
//! movable entities of an [`OptimizationProblem`]: a candidate move is kept
//! when it scores at least as well as the current solution or as the
//! solution from `late_acceptance_size` steps ago.

use std::time::{Duration, Instant};

use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;
use tracing::debug;

use crate::error::SolverError;
use crate::storage::OptimizationConfig;
use crate::time::TimeGrain;

use super::constraints::{calculate_score, ScoringContext};
use super::event::OptimizerEvent;
use super::problem::OptimizationProblem;
use super::score::HardMediumSoftScore;

/// Largest number of grains a shift move travels.
const MAX_SHIFT_GRAINS: i64 = 4;
const PROGRESS_LOG_INTERVAL: u64 = 10_000;

/// Turns a problem skeleton into an improved solution.
pub trait Solver: Send + Sync {
    fn solve(&self, problem: OptimizationProblem) -> Result<OptimizationProblem, SolverError>;
}

/// Solver termination and search settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Wall-clock budget for one solve.
    pub time_budget: Duration,
    /// Optional cap on evaluated moves, mostly for deterministic tests.
    pub step_limit: Option<u64>,
    pub late_acceptance_size: usize,
    /// Random seed for reproducibility (None = random)
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(10),
            step_limit: None,
            late_acceptance_size: 400,
            seed: None,
        }
    }
}

impl SolverConfig {
    pub fn from_config(config: &OptimizationConfig) -> Self {
        Self {
            time_budget: Duration::from_secs(config.solver_time_budget_secs),
            step_limit: None,
            late_acceptance_size: config.late_acceptance_size,
            seed: config.solver_seed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Undo {
    index: usize,
    start: TimeGrain,
    duration: u32,
}

#[derive(Debug, Default)]
pub struct LateAcceptanceSolver {
    config: SolverConfig,
}

impl LateAcceptanceSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn rng(&self) -> Mcg128Xsl64 {
        match self.config.seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        }
    }

    fn should_stop(&self, started: Instant, step: u64) -> bool {
        self.config.step_limit.is_some_and(|limit| step >= limit) || started.elapsed() >= self.config.time_budget
    }

    /// Apply one random move to a movable entity and return how to revert it.
    /// Returns `None` when the drawn move would leave the start grain range.
    fn random_move(
        rng: &mut Mcg128Xsl64,
        schedule: &mut [OptimizerEvent],
        movable: &[usize],
        grains: &[TimeGrain],
        focus_durations: &[u32],
    ) -> Option<Undo> {
        let index = *movable.choose(rng)?;
        let event = &mut schedule[index];
        let undo = Undo {
            index,
            start: event.start_time_grain,
            duration: event.duration_in_time_grains,
        };

        let kinds = if event.is_focus_time() { 4 } else { 2 };
        match rng.gen_range(0..kinds) {
            0 => {
                event.start_time_grain = *grains.choose(rng)?;
            }
            1 => {
                let mut shift = rng.gen_range(1..=MAX_SHIFT_GRAINS);
                if rng.gen_bool(0.5) {
                    shift = -shift;
                }
                let shifted = event.start_time_grain.offset(shift);
                let first = grains.first()?;
                let last = grains.last()?;
                if shifted < *first || shifted > *last {
                    return None;
                }
                event.start_time_grain = shifted;
            }
            2 => {
                event.duration_in_time_grains = *focus_durations.choose(rng)?;
            }
            _ => {
                event.start_time_grain = *grains.choose(rng)?;
                event.duration_in_time_grains = *focus_durations.choose(rng)?;
            }
        }

        if event.start_time_grain == undo.start && event.duration_in_time_grains == undo.duration {
            return None;
        }
        Some(undo)
    }
}

fn revert(schedule: &mut [OptimizerEvent], undo: Undo) {
    let event = &mut schedule[undo.index];
    event.start_time_grain = undo.start;
    event.duration_in_time_grains = undo.duration;
}

impl Solver for LateAcceptanceSolver {
    fn solve(&self, mut problem: OptimizationProblem) -> Result<OptimizationProblem, SolverError> {
        if self.config.late_acceptance_size == 0 {
            return Err(SolverError::InvalidProblem("late acceptance size must be positive".into()));
        }
        let grains = problem.parametrization.planning_time_grains();
        if grains.is_empty() {
            return Err(SolverError::InvalidProblem("planning range contains no time grains".into()));
        }

        let ctx = ScoringContext::new(&problem);
        let movable = problem.movable_entity_indices();
        let initial = calculate_score(&problem.schedule, &ctx);

        if movable.is_empty() {
            debug!(score = %initial, "nothing to move");
            problem.score = Some(initial);
            return Ok(problem);
        }

        let focus_durations = problem
            .schedule
            .iter()
            .find(|e| e.is_focus_time())
            .map(OptimizerEvent::duration_range)
            .unwrap_or_default();

        let mut rng = self.rng();
        let mut schedule = problem.schedule;
        let mut current: HardMediumSoftScore = initial;
        let mut best = initial;
        let mut best_schedule = schedule.clone();
        let mut history = vec![initial; self.config.late_acceptance_size];
        let started = Instant::now();
        let mut step: u64 = 0;
        let mut accepted: u64 = 0;

        while !self.should_stop(started, step) {
            let slot = (step % history.len() as u64) as usize;
            step += 1;

            let Some(undo) = Self::random_move(&mut rng, &mut schedule, &movable, &grains, &focus_durations) else {
                continue;
            };

            let candidate = calculate_score(&schedule, &ctx);
            if candidate >= current || candidate >= history[slot] {
                current = candidate;
                accepted += 1;
                if candidate > best {
                    best = candidate;
                    best_schedule.clone_from(&schedule);
                }
            } else {
                revert(&mut schedule, undo);
            }
            history[slot] = current;

            if step % PROGRESS_LOG_INTERVAL == 0 {
                debug!(step, accepted, current = %current, best = %best, "solver progress");
            }
        }

        debug!(
            steps = step,
            accepted,
            initial = %initial,
            best = %best,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "solver finished"
        );

        problem.schedule = best_schedule;
        problem.score = Some(best);
        Ok(problem)
    }
}
