//! User and preference commands.

use chrono::Weekday;
use chrono_tz::Tz;
use clap::Subcommand;
use clockpanda_core::storage::Database;
use clockpanda_core::time::LocalTimeRange;
use clockpanda_core::user::{User, UserPreferences, UserRepository};

use super::{parse_time_range, parse_timezone, parse_weekday, CliResult};

#[derive(Subcommand)]
pub enum UserAction {
    /// Add a user, or replace the preferences of an existing one
    Add {
        email: String,
        /// IANA timezone, e.g. "Europe/Berlin"
        #[arg(long, value_parser = parse_timezone, default_value = "UTC")]
        timezone: Tz,
        /// Weekly focus time target in hours
        #[arg(long, default_value = "10")]
        target_hours: u32,
        /// Add the user without preferences; they are skipped until set
        #[arg(long, conflicts_with_all = ["timezone", "target_hours"])]
        no_preferences: bool,
    },
    /// List users
    List,
    /// Show one user
    Show { email: String },
    /// Remove a user and their personal tasks
    Remove { email: String },
    /// Set the working hours of one weekday, e.g. `mon 09:00-17:00`
    SetWorkingHours {
        email: String,
        #[arg(value_parser = parse_weekday)]
        day: Weekday,
        #[arg(value_parser = parse_time_range)]
        hours: LocalTimeRange,
    },
    /// Remove the working hours of one weekday
    ClearWorkingHours {
        email: String,
        #[arg(value_parser = parse_weekday)]
        day: Weekday,
    },
    /// Set or clear the preferred focus time range
    SetFocusRange {
        email: String,
        #[arg(value_parser = parse_time_range, required_unless_present = "clear")]
        range: Option<LocalTimeRange>,
        #[arg(long)]
        clear: bool,
    },
    /// Set the weekly focus time target
    SetTarget { email: String, hours: u32 },
    /// Store or clear the calendar refresh token
    SetToken {
        email: String,
        #[arg(required_unless_present = "clear")]
        token: Option<String>,
        #[arg(long)]
        clear: bool,
    },
}

fn load(db: &Database, email: &str) -> Result<User, Box<dyn std::error::Error>> {
    db.get_user(email)?
        .ok_or_else(|| format!("unknown user: {email}").into())
}

/// Apply `change` to the user's preferences and store them.
fn update_preferences(
    db: &Database,
    email: &str,
    change: impl FnOnce(&mut UserPreferences),
) -> CliResult {
    let mut user = load(db, email)?;
    let prefs = user
        .preferences
        .get_or_insert_with(|| UserPreferences::new(chrono_tz::UTC, 0));
    change(prefs);
    prefs.validate()?;
    db.upsert_user(&user)?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

pub fn run(action: UserAction) -> CliResult {
    let db = Database::open()?;

    match action {
        UserAction::Add {
            email,
            timezone,
            target_hours,
            no_preferences,
        } => {
            let mut user = User::new(email);
            if !no_preferences {
                let prefs = UserPreferences::new(timezone, target_hours);
                prefs.validate()?;
                user.preferences = Some(prefs);
            }
            db.upsert_user(&user)?;
            println!("User saved: {}", user.email);
        }
        UserAction::List => {
            let users = db.list()?;
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
        UserAction::Show { email } => {
            let user = load(&db, &email)?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UserAction::Remove { email } => {
            if !db.delete_user(&email)? {
                return Err(format!("unknown user: {email}").into());
            }
            println!("User removed: {email}");
        }
        UserAction::SetWorkingHours { email, day, hours } => {
            update_preferences(&db, &email, |p| p.set_working_hours(day, hours))?;
        }
        UserAction::ClearWorkingHours { email, day } => {
            update_preferences(&db, &email, |p| p.clear_working_hours(day))?;
        }
        UserAction::SetFocusRange { email, range, clear } => {
            let range = if clear { None } else { range };
            update_preferences(&db, &email, |p| p.preferred_focus_time_range = range)?;
        }
        UserAction::SetTarget { email, hours } => {
            update_preferences(&db, &email, |p| p.target_focus_time_hours_per_week = hours)?;
        }
        UserAction::SetToken { email, token, clear } => {
            let token = if clear { None } else { token };
            if !db.set_refresh_token(&email, token.as_deref())? {
                return Err(format!("unknown user: {email}").into());
            }
            println!(
                "{}",
                if token.is_some() {
                    "refresh token stored"
                } else {
                    "refresh token cleared"
                }
            );
        }
    }
    Ok(())
}
