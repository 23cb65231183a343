//! # Clock Panda Core Library
//!
//! Clock Panda protects focus time: it reads a user's calendar, plans
//! focus-time blocks and personal tasks around existing meetings, and writes
//! the plan back as calendar events it owns. All operations are available
//! through the `clockpanda` CLI, which is a thin layer over this library.
//!
//! ## Architecture
//!
//! - **Time**: 15-minute grains, half-open spans and the overlap geometry
//!   the constraints are built on
//! - **Calendar**: provider boundary with Google and in-memory facades
//! - **Optimizer**: planning problem, hard/medium/soft constraints, a
//!   late-acceptance solver, reconciliation and the periodic job
//! - **Storage**: SQLite users and tasks, TOML configuration, OS keyring
//!
//! ## Key Components
//!
//! - [`OptimizationService`]: builds, solves and syncs per-user schedules
//! - [`OptimizationCronJob`]: periodic, non-overlapping optimization passes
//! - [`CalendarFacade`]: trait for calendar providers
//! - [`Database`]: user and personal-task persistence
//! - [`Config`]: application configuration management

pub mod calendar;
pub mod error;
pub mod optimizer;
pub mod storage;
pub mod task;
pub mod time;
pub mod user;

pub use calendar::{CalendarEvent, CalendarEventType, CalendarFacade, GoogleCalendarFacade, InMemoryCalendarFacade};
pub use error::{
    CalendarError, ConfigError, CoreError, DatabaseError, OptimizationError, SolverError, Stage, ValidationError,
};
pub use optimizer::{
    HardMediumSoftScore, LateAcceptanceSolver, OptimizationCronJob, OptimizationProblem,
    OptimizationProblemParametrization, OptimizationResult, OptimizationService, OptimizationSettings,
    OptimizerEvent, ReconciliationReport, Solver, SolverConfig,
};
pub use storage::{Config, Database};
pub use task::{PersonalTask, PersonalTaskRepository, Recurrence};
pub use time::{LocalTimeRange, TimeGrain, TimeSpan};
pub use user::{User, UserPreferences, UserRepository};
