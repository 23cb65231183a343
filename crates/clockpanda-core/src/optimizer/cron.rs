//! Periodic optimization job.
//!
//! One pass lists the users, optimizes each and syncs each successful result.
//! Failures and panics are logged per user and stage and never escape the
//! pass; passes never overlap.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar::CalendarFacade;
use crate::error::{OptimizationError, Stage};
use crate::task::PersonalTaskRepository;
use crate::user::{User, UserRepository};

use super::panic_message;
use super::reconcile::ReconciliationReport;
use super::service::{OptimizationResult, OptimizationService};
use super::solver::Solver;

/// What the cron job needs from the optimization service.
pub trait ScheduleOptimizer: Send + Sync {
    fn list_users(&self) -> Result<Vec<User>, OptimizationError>;

    fn optimize_user(&self, user: &User, reference: DateTime<Utc>) -> Result<OptimizationResult, OptimizationError>;

    fn sync_user(&self, result: &OptimizationResult) -> Result<ReconciliationReport, OptimizationError>;
}

impl<U, T, C, S> ScheduleOptimizer for OptimizationService<U, T, C, S>
where
    U: UserRepository,
    T: PersonalTaskRepository,
    C: CalendarFacade,
    S: Solver,
{
    fn list_users(&self) -> Result<Vec<User>, OptimizationError> {
        OptimizationService::list_users(self)
    }

    fn optimize_user(&self, user: &User, reference: DateTime<Utc>) -> Result<OptimizationResult, OptimizationError> {
        OptimizationService::optimize_user(self, user, reference)
    }

    fn sync_user(&self, result: &OptimizationResult) -> Result<ReconciliationReport, OptimizationError> {
        self.sync_optimized_schedule_with_user_calendar(result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronFailure {
    /// `None` when the failure happened before users were known.
    pub email: Option<String>,
    pub stage: String,
    pub message: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct CronRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users: usize,
    pub optimized: usize,
    pub synced: usize,
    /// Users without preferences.
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failures: Vec<CronFailure>,
}

impl CronRunSummary {
    fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            users: 0,
            optimized: 0,
            synced: 0,
            skipped: 0,
            created: 0,
            updated: 0,
            deleted: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, email: Option<&str>, stage: Stage, message: String) {
        self.failures.push(CronFailure {
            email: email.map(str::to_string),
            stage: stage.to_string(),
            message,
        });
    }
}

fn stage_of(error: &OptimizationError) -> Stage {
    match error {
        OptimizationError::Calendar { stage, .. } => *stage,
        OptimizationError::DataSource(_) => Stage::ListTasks,
        OptimizationError::MissingPreferences { .. } | OptimizationError::Solver { .. } => Stage::Solve,
    }
}

/// Clears the running flag when a pass ends, panicking or not.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct OptimizationCronJob<O> {
    optimizer: O,
    interval: Duration,
    running: AtomicBool,
}

impl<O: ScheduleOptimizer> OptimizationCronJob<O> {
    pub fn new(optimizer: O, interval: Duration) -> Self {
        Self {
            optimizer,
            interval,
            running: AtomicBool::new(false),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one pass now. Returns `None` when another pass is still running.
    pub fn run_once(&self) -> Option<CronRunSummary> {
        self.run_once_at(Utc::now())
    }

    pub fn run_once_at(&self, reference: DateTime<Utc>) -> Option<CronRunSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("previous optimization run still in progress, skipping");
            return None;
        }
        let _guard = RunGuard(&self.running);

        let run_id = Uuid::new_v4();
        let mut summary = CronRunSummary::new(run_id, Utc::now());
        info!(%run_id, %reference, "optimization run started");

        match self.guarded(Stage::ListUsers, None, || self.optimizer.list_users()) {
            Ok(users) => {
                summary.users = users.len();
                for user in &users {
                    self.run_user(user, reference, &mut summary);
                }
            }
            Err(message) => {
                error!(%run_id, stage = %Stage::ListUsers, %message, "could not list users");
                summary.fail(None, Stage::ListUsers, message);
            }
        }

        summary.finished_at = Utc::now();
        info!(
            %run_id,
            users = summary.users,
            optimized = summary.optimized,
            synced = summary.synced,
            skipped = summary.skipped,
            failures = summary.failures.len(),
            elapsed_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
            "optimization run finished"
        );
        Some(summary)
    }

    /// Run `f`, turning both errors and panics into a message.
    fn guarded<R>(
        &self,
        stage: Stage,
        email: Option<&str>,
        f: impl FnOnce() -> Result<R, OptimizationError>,
    ) -> Result<R, String> {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(email = email.unwrap_or("-"), %stage, %message, "panicked");
                Err(format!("panicked: {message}"))
            }
        }
    }

    fn run_user(&self, user: &User, reference: DateTime<Utc>, summary: &mut CronRunSummary) {
        let email = user.email.as_str();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.optimizer.optimize_user(user, reference)));
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(OptimizationError::MissingPreferences { .. })) => {
                info!(email, "no preferences, skipping");
                summary.skipped += 1;
                return;
            }
            Ok(Err(err)) => {
                let stage = stage_of(&err);
                warn!(email, %stage, error = %err, "optimization failed");
                summary.fail(Some(email), stage, err.to_string());
                return;
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(email, stage = %Stage::Solve, %message, "optimization panicked");
                summary.fail(Some(email), Stage::Solve, format!("panicked: {message}"));
                return;
            }
        };
        summary.optimized += 1;

        match self.guarded(Stage::Sync, Some(email), || self.optimizer.sync_user(&result)) {
            Ok(report) => {
                summary.synced += 1;
                summary.created += report.created;
                summary.updated += report.updated;
                summary.deleted += report.deleted;
                for failure in report.failures {
                    summary.fail(
                        Some(email),
                        Stage::Sync,
                        format!("{} {}: {}", failure.operation, failure.event_id, failure.error),
                    );
                }
            }
            Err(message) => {
                warn!(email, stage = %Stage::Sync, %message, "sync failed");
                summary.fail(Some(email), Stage::Sync, message);
            }
        }
    }
}

impl<O: ScheduleOptimizer + 'static> OptimizationCronJob<O> {
    /// Run a pass every interval until `shutdown` resolves. Passes run on
    /// the blocking pool; ticks missed during a long pass are skipped.
    pub async fn run_until<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        info!(interval_secs = self.interval.as_secs(), "optimization cron started");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let job = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || job.run_once()).await {
                        error!(error = %e, "optimization run task failed");
                    }
                }
            }
        }
        info!("optimization cron stopped");
    }

    /// Run until Ctrl-C.
    pub async fn run_forever(self: Arc<Self>) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CalendarError, SolverError};
    use crate::optimizer::problem::OptimizationProblemParametrization;
    use crate::optimizer::reconcile::{Operation, ReconciliationFailure};
    use crate::optimizer::score::HardMediumSoftScore;
    use crate::user::UserPreferences;
    use chrono::{TimeZone, Weekday};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::sync::Mutex;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 8, 19, 8, 0, 0).unwrap()
    }

    fn result_for(user: &User) -> OptimizationResult {
        OptimizationResult {
            user: user.clone(),
            parametrization: OptimizationProblemParametrization::new(reference(), 1, Weekday::Mon),
            events: Vec::new(),
            score: HardMediumSoftScore::ZERO,
        }
    }

    /// Behaviour keyed by the local part of the email.
    #[derive(Default)]
    struct ScriptedOptimizer {
        users: Vec<User>,
        fail_listing: bool,
        synced: Mutex<Vec<String>>,
        list_calls: AtomicUsize,
    }

    impl ScriptedOptimizer {
        fn with_users(emails: &[&str]) -> Self {
            Self {
                users: emails
                    .iter()
                    .map(|e| User::new(*e).with_preferences(UserPreferences::new(chrono_tz::UTC, 10)))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl ScheduleOptimizer for ScriptedOptimizer {
        fn list_users(&self) -> Result<Vec<User>, OptimizationError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_listing {
                return Err(OptimizationError::DataSource(crate::error::DatabaseError::Locked));
            }
            Ok(self.users.clone())
        }

        fn optimize_user(&self, user: &User, _reference: DateTime<Utc>) -> Result<OptimizationResult, OptimizationError> {
            match user.email.split('@').next() {
                Some("panics") => panic!("solver blew up"),
                Some("nopref") => Err(OptimizationError::MissingPreferences {
                    email: user.email.clone(),
                }),
                Some("offline") => Err(OptimizationError::Calendar {
                    email: user.email.clone(),
                    stage: Stage::ListEvents,
                    source: CalendarError::NotAuthenticated {
                        email: user.email.clone(),
                    },
                }),
                Some("stuck") => Err(OptimizationError::Solver {
                    email: user.email.clone(),
                    source: SolverError::InvalidProblem("no grains".into()),
                }),
                _ => Ok(result_for(user)),
            }
        }

        fn sync_user(&self, result: &OptimizationResult) -> Result<ReconciliationReport, OptimizationError> {
            self.synced
                .lock()
                .unwrap()
                .push(result.user.email.clone());
            match result.user.email.split('@').next() {
                Some("syncpanic") => panic!("sync blew up"),
                Some("partial") => Ok(ReconciliationReport {
                    created: 1,
                    failures: vec![ReconciliationFailure {
                        operation: Operation::Delete,
                        event_id: "ev-1".into(),
                        error: CalendarError::Api {
                            status: 500,
                            message: "boom".into(),
                        },
                    }],
                    ..ReconciliationReport::default()
                }),
                _ => Ok(ReconciliationReport {
                    created: 2,
                    deleted: 1,
                    ..ReconciliationReport::default()
                }),
            }
        }
    }

    #[test]
    fn failing_users_do_not_stop_the_pass() {
        let optimizer = ScriptedOptimizer::with_users(&[
            "panics@example.com",
            "ok@example.com",
            "nopref@example.com",
            "offline@example.com",
            "stuck@example.com",
            "syncpanic@example.com",
            "partial@example.com",
        ]);
        let job = OptimizationCronJob::new(optimizer, Duration::from_secs(1800));

        let summary = job.run_once_at(reference()).unwrap();

        assert_eq!(summary.users, 7);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.optimized, 3);
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.created, 3);
        assert_eq!(summary.deleted, 1);

        let stages: Vec<(Option<&str>, &str)> = summary
            .failures
            .iter()
            .map(|f| (f.email.as_deref(), f.stage.as_str()))
            .collect();
        assert_eq!(
            stages,
            vec![
                (Some("panics@example.com"), "solve"),
                (Some("offline@example.com"), "list-events"),
                (Some("stuck@example.com"), "solve"),
                (Some("syncpanic@example.com"), "sync"),
                (Some("partial@example.com"), "sync"),
            ]
        );
        assert!(summary.failures[0].message.contains("solver blew up"));
        assert!(summary.failures[4].message.contains("ev-1"));
        assert!(!job.is_running());
    }

    #[test]
    fn listing_failure_is_reported_without_users() {
        let optimizer = ScriptedOptimizer {
            fail_listing: true,
            ..ScriptedOptimizer::default()
        };
        let job = OptimizationCronJob::new(optimizer, Duration::from_secs(1800));
        let summary = job.run_once_at(reference()).unwrap();
        assert_eq!(summary.users, 0);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].email, None);
        assert_eq!(summary.failures[0].stage, "list-users");
    }

    /// Blocks inside `list_users` until released.
    struct BlockingOptimizer {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ScheduleOptimizer for BlockingOptimizer {
        fn list_users(&self) -> Result<Vec<User>, OptimizationError> {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(Vec::new())
        }

        fn optimize_user(&self, user: &User, _reference: DateTime<Utc>) -> Result<OptimizationResult, OptimizationError> {
            Ok(result_for(user))
        }

        fn sync_user(&self, _result: &OptimizationResult) -> Result<ReconciliationReport, OptimizationError> {
            Ok(ReconciliationReport::default())
        }
    }

    #[test]
    fn overlapping_run_is_skipped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let job = Arc::new(OptimizationCronJob::new(
            BlockingOptimizer {
                entered: Mutex::new(entered_tx),
                release: Mutex::new(release_rx),
            },
            Duration::from_secs(1800),
        ));

        let background = {
            let job = Arc::clone(&job);
            std::thread::spawn(move || job.run_once_at(reference()))
        };
        entered_rx.recv().unwrap();

        assert!(job.is_running());
        assert!(job.run_once_at(reference()).is_none());

        release_tx.send(()).unwrap();
        assert!(background.join().unwrap().is_some());
        assert!(!job.is_running());
    }

    #[tokio::test]
    async fn run_until_runs_first_tick_and_stops() {
        let job = Arc::new(OptimizationCronJob::new(
            ScriptedOptimizer::with_users(&["ok@example.com"]),
            Duration::from_secs(3600),
        ));
        let handle = Arc::clone(&job);
        job.run_until(tokio::time::sleep(Duration::from_millis(300)))
            .await;
        assert_eq!(handle.optimizer.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*handle.optimizer.synced.lock().unwrap(), vec!["ok@example.com".to_string()]);
    }
}
