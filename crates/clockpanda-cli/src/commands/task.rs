//! Personal task commands.

use chrono::NaiveDate;
use clap::{ArgGroup, Subcommand};
use clockpanda_core::storage::Database;
use clockpanda_core::task::{PersonalTask, PersonalTaskRepository, Recurrence};
use clockpanda_core::time::LocalTimeRange;
use uuid::Uuid;

use super::{parse_days, parse_time_range, CliResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a personal task
    #[command(group(ArgGroup::new("recurrence").required(true).args(["on", "daily", "weekly"])))]
    Add {
        /// Owner email
        email: String,
        /// Task title
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Duration in minutes
        #[arg(long, default_value = "30")]
        duration: u32,
        /// Single occurrence on this date (YYYY-MM-DD)
        #[arg(long)]
        on: Option<NaiveDate>,
        /// Every day
        #[arg(long)]
        daily: bool,
        /// Comma-separated weekdays, e.g. "mon,wed,fri"
        #[arg(long)]
        weekly: Option<String>,
        /// Preferred time of day, e.g. "12:00-13:00"
        #[arg(long, value_parser = parse_time_range)]
        preferred: Option<LocalTimeRange>,
    },
    /// List a user's personal tasks
    List { email: String },
    /// Remove a personal task
    Remove { id: String },
}

pub fn run(action: TaskAction) -> CliResult {
    let db = Database::open()?;

    match action {
        TaskAction::Add {
            email,
            title,
            description,
            duration,
            on,
            daily,
            weekly,
            preferred,
        } => {
            if db.get_user(&email)?.is_none() {
                return Err(format!("unknown user: {email}").into());
            }
            let recurrence = match (on, weekly) {
                (Some(date), _) => Recurrence::OneOff { date },
                (None, Some(days)) => Recurrence::Weekly { days: parse_days(&days)? },
                (None, None) if daily => Recurrence::Daily,
                (None, None) => return Err("one of --on, --daily or --weekly is required".into()),
            };
            let task = PersonalTask {
                id: Uuid::new_v4().to_string(),
                owner_email: email,
                title,
                description,
                duration_minutes: duration,
                recurrence,
                preferred_time: preferred,
            };
            task.validate()?;
            db.upsert_personal_task(&task)?;
            println!("Task created: {}", task.id);
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List { email } => {
            let tasks = db.list_by_user_email(&email)?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        TaskAction::Remove { id } => {
            if !db.delete_personal_task(&id)? {
                return Err(format!("unknown task: {id}").into());
            }
            println!("Task removed: {id}");
        }
    }
    Ok(())
}
