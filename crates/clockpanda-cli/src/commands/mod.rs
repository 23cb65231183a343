pub mod auth;
pub mod config;
pub mod optimize;
pub mod task;
pub mod user;

use chrono::Weekday;
use chrono_tz::Tz;
use clockpanda_core::time::LocalTimeRange;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn parse_weekday(s: &str) -> Result<Weekday, String> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| format!("'{s}' is not a day of the week"))
}

/// Comma-separated days, e.g. `mon,wed,fri`.
pub fn parse_days(s: &str) -> Result<Vec<Weekday>, String> {
    let mut days = Vec::new();
    for part in s.split(',').filter(|p| !p.trim().is_empty()) {
        let day = parse_weekday(part)?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return Err("at least one day is required".into());
    }
    Ok(days)
}

pub fn parse_timezone(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>().map_err(|_| format!("unknown timezone '{s}'"))
}

pub fn parse_time_range(s: &str) -> Result<LocalTimeRange, String> {
    LocalTimeRange::parse(s).map_err(|e| e.to_string())
}
