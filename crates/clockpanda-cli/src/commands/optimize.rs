//! Optimization commands: one-off runs, the periodic daemon and score
//! explanations.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use clockpanda_core::calendar::{
    AccessTokenCache, CalendarFacade, GoogleCalendarFacade, GoogleCalendarSettings, OAuthClientConfig,
};
use clockpanda_core::optimizer::{
    LateAcceptanceSolver, OptimizationCronJob, OptimizationResult, OptimizationService, OptimizationSettings,
    Solver, SolverConfig, UserOptimization,
};
use clockpanda_core::storage::{keyring_store, Config, Database};
use clockpanda_core::task::PersonalTaskRepository;
use clockpanda_core::user::{User, UserRepository};
use serde_json::json;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use super::CliResult;

type GoogleService = OptimizationService<Arc<Database>, Arc<Database>, GoogleCalendarFacade, LateAcceptanceSolver>;

#[derive(Subcommand)]
pub enum OptimizeAction {
    /// Optimize now and sync the result to the calendar
    Run {
        /// Print the planned schedule without touching the calendar
        #[arg(long)]
        dry_run: bool,
        /// Only optimize this user
        #[arg(long)]
        email: Option<String>,
    },
    /// Optimize every configured interval until interrupted
    Daemon,
    /// Optimize one user and print the score breakdown per constraint
    Explain {
        #[arg(long)]
        email: String,
    },
}

fn oauth_client(config: &Config) -> Result<OAuthClientConfig, Box<dyn std::error::Error>> {
    const MISSING: &str = "Google client credentials missing; run `clockpanda auth set-credentials`";
    let client_id = keyring_store::get(keyring_store::GOOGLE_CLIENT_ID)?.ok_or(MISSING)?;
    let client_secret = keyring_store::get(keyring_store::GOOGLE_CLIENT_SECRET)?.ok_or(MISSING)?;
    Ok(OAuthClientConfig {
        client_id,
        client_secret,
        token_url: config.google.token_url.clone(),
    })
}

fn build_service(
    config: &Config,
    db: Arc<Database>,
    runtime: &Runtime,
) -> Result<GoogleService, Box<dyn std::error::Error>> {
    let tokens = Arc::new(AccessTokenCache::new(chrono::Duration::seconds(
        config.google.token_expiry_margin_secs,
    )));
    let calendar = GoogleCalendarFacade::new(
        GoogleCalendarSettings {
            api_base_url: config.google.api_base_url.clone(),
            oauth: oauth_client(config)?,
        },
        tokens,
        runtime.handle().clone(),
    );
    let solver = LateAcceptanceSolver::new(SolverConfig::from_config(&config.optimization));
    let settings = OptimizationSettings::from_config(config)?;
    Ok(OptimizationService::new(Arc::clone(&db), db, calendar, solver, settings))
}

fn find_user(db: &Database, email: &str) -> Result<User, Box<dyn std::error::Error>> {
    db.get_user(email)?
        .ok_or_else(|| format!("unknown user: {email}").into())
}

fn describe(result: &OptimizationResult) -> serde_json::Value {
    let tz = result.timezone();
    json!({
        "email": result.user.email,
        "score": result.score.to_string(),
        "planning_range": result.parametrization.planning_entity_optimization_range().to_string(),
        "events": result.events.iter().map(|e| json!({
            "type": e.event_type,
            "title": e.title,
            "start": e.start_time().with_timezone(&tz).to_rfc3339(),
            "end": e.end_time().with_timezone(&tz).to_rfc3339(),
            "moved": e.has_changed_from_original(tz),
        })).collect::<Vec<_>>(),
    })
}

/// Tallies of one `optimize run`.
#[derive(Debug, Default, PartialEq, Eq)]
struct RunTotals {
    optimized: usize,
    synced: usize,
    created: usize,
    updated: usize,
    deleted: usize,
    failed: usize,
}

/// Sync every successful outcome, or print it on a dry run. A user whose
/// optimization or sync fails is logged and counted; the others still run.
fn sync_outcomes<U, T, C, S>(
    service: &OptimizationService<U, T, C, S>,
    outcomes: Vec<UserOptimization>,
    dry_run: bool,
) -> Result<RunTotals, Box<dyn std::error::Error>>
where
    U: UserRepository,
    T: PersonalTaskRepository,
    C: CalendarFacade,
    S: Solver,
{
    let mut totals = RunTotals::default();
    for UserOptimization { email, outcome } in outcomes {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                error!(email = %email, error = %e, "optimization failed");
                totals.failed += 1;
                continue;
            }
        };
        totals.optimized += 1;
        if dry_run {
            println!("{}", serde_json::to_string_pretty(&describe(&result))?);
            continue;
        }

        let report = match service.sync_optimized_schedule_with_user_calendar(&result) {
            Ok(report) => report,
            Err(e) => {
                error!(email = %email, error = %e, "sync failed");
                totals.failed += 1;
                continue;
            }
        };
        totals.synced += 1;
        totals.created += report.created;
        totals.updated += report.updated;
        totals.deleted += report.deleted;
        println!(
            "{email}: {} created, {} updated, {} deleted, {} unchanged (score {})",
            report.created, report.updated, report.deleted, report.unchanged, result.score
        );
        for f in &report.failures {
            warn!(email = %email, operation = %f.operation, event_id = %f.event_id, error = %f.error, "calendar call failed");
            totals.failed += 1;
        }
    }
    Ok(totals)
}

pub fn run(action: OptimizeAction) -> CliResult {
    let config = Config::load()?;
    let db = Arc::new(Database::open()?);

    match action {
        OptimizeAction::Run { dry_run, email } => {
            let selected = email.as_deref().map(|e| find_user(&db, e)).transpose()?;
            let runtime = Runtime::new()?;
            let service = build_service(&config, Arc::clone(&db), &runtime)?;
            let now = Utc::now();

            let outcomes = match selected {
                Some(user) => vec![UserOptimization {
                    email: user.email.clone(),
                    outcome: service.optimize_user(&user, now),
                }],
                None => service.calculate_optimized_schedule_at(now)?,
            };

            let totals = sync_outcomes(&service, outcomes, dry_run)?;
            info!(
                optimized = totals.optimized,
                synced = totals.synced,
                created = totals.created,
                updated = totals.updated,
                deleted = totals.deleted,
                failed = totals.failed,
                "optimization run finished"
            );
            if totals.failed > 0 {
                return Err(format!("{} failure(s) during optimization", totals.failed).into());
            }
        }
        OptimizeAction::Daemon => {
            let runtime = Runtime::new()?;
            let service = build_service(&config, db, &runtime)?;
            let interval = Duration::from_secs(config.optimization.cron_interval_minutes * 60);
            let job = Arc::new(OptimizationCronJob::new(service, interval));
            info!(interval_minutes = config.optimization.cron_interval_minutes, "starting optimization daemon");
            runtime.block_on(job.run_forever());
        }
        OptimizeAction::Explain { email } => {
            let user = find_user(&db, &email)?;
            let runtime = Runtime::new()?;
            let service = build_service(&config, Arc::clone(&db), &runtime)?;
            let explanation = service.explain_user(&user, Utc::now())?;
            let output = json!({
                "schedule": describe(&explanation.result),
                "constraints": explanation.constraints,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Weekday};
    use clockpanda_core::calendar::InMemoryCalendarFacade;
    use clockpanda_core::time::LocalTimeRange;
    use clockpanda_core::user::UserPreferences;

    type MemoryService =
        OptimizationService<Arc<Database>, Arc<Database>, Arc<InMemoryCalendarFacade>, LateAcceptanceSolver>;

    const EMAILS: [&str; 3] = ["a@example.com", "b@example.com", "c@example.com"];

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 8, 19, 8, 0, 0).unwrap()
    }

    fn setup() -> (MemoryService, Arc<InMemoryCalendarFacade>) {
        let db = Arc::new(Database::open_memory().unwrap());
        for email in EMAILS {
            let mut prefs = UserPreferences::new(chrono_tz::UTC, 6);
            for day in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
                prefs.set_working_hours(day, LocalTimeRange::parse("09:00-17:00").unwrap());
            }
            db.upsert_user(&User::new(email).with_preferences(prefs)).unwrap();
        }
        let calendar = Arc::new(InMemoryCalendarFacade::new());
        let solver = LateAcceptanceSolver::new(SolverConfig {
            time_budget: Duration::from_secs(60),
            step_limit: Some(20_000),
            late_acceptance_size: 50,
            seed: Some(7),
        });
        let settings = OptimizationSettings {
            max_range_weeks: 1,
            ..OptimizationSettings::default()
        };
        let service = OptimizationService::new(Arc::clone(&db), db, Arc::clone(&calendar), solver, settings);
        (service, calendar)
    }

    #[test]
    fn failed_sync_does_not_stop_later_users() {
        let (service, calendar) = setup();
        let outcomes = service.calculate_optimized_schedule_at(reference()).unwrap();
        calendar.fail_listing_for("b@example.com");

        let totals = sync_outcomes(&service, outcomes, false).unwrap();

        assert_eq!(totals.optimized, 3);
        assert_eq!(totals.synced, 2);
        assert_eq!(totals.failed, 1);
        assert!(calendar.events("b@example.com").is_empty());
        assert!(!calendar.events("c@example.com").is_empty());
        assert_eq!(
            totals.created,
            calendar.events("a@example.com").len() + calendar.events("c@example.com").len()
        );
    }

    #[test]
    fn failed_optimization_is_counted_and_others_sync() {
        let (service, calendar) = setup();
        calendar.fail_listing_for("a@example.com");
        let outcomes = service.calculate_optimized_schedule_at(reference()).unwrap();

        let totals = sync_outcomes(&service, outcomes, false).unwrap();

        assert_eq!(totals.failed, 1);
        assert_eq!(totals.optimized, 2);
        assert_eq!(totals.synced, 2);
    }

    #[test]
    fn dry_run_leaves_calendar_alone() {
        let (service, calendar) = setup();
        let outcomes = service.calculate_optimized_schedule_at(reference()).unwrap();

        let totals = sync_outcomes(&service, outcomes, true).unwrap();

        assert_eq!(totals.optimized, 3);
        assert_eq!(totals.synced, 0);
        assert!(calendar.mutations().is_empty());
    }
}
