//! Discrete time model: grains, spans and local-time helpers.

mod grain;
mod span;

pub use grain::{grains_for_minutes, TimeGrain, GRAIN_LENGTH_MINUTES};
pub use span::{compute_outside_range_in_minutes, compute_overlap_in_minutes, TimeSpan};

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A time-of-day window such as `09:00-17:00`, interpreted in a user's zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl LocalTimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidValue {
                field: "time_range".into(),
                message: format!("end {end} must be after start {start}"),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse `HH:MM-HH:MM`.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let invalid = |message: String| ValidationError::InvalidValue {
            field: "time_range".into(),
            message,
        };
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| invalid(format!("expected HH:MM-HH:MM, got '{s}'")))?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
            .map_err(|e| invalid(format!("bad start '{start}': {e}")))?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")
            .map_err(|e| invalid(format!("bad end '{end}': {e}")))?;
        Self::new(start, end)
    }

    /// Concrete span of this window on `date` in `tz`.
    pub fn on(&self, date: NaiveDate, tz: Tz) -> TimeSpan {
        let start = local_to_utc(date, self.start, tz);
        let end = local_to_utc(date, self.end, tz);
        TimeSpan::new(start, end.max(start))
    }
}

impl std::fmt::Display for LocalTimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Resolve a wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside a
/// DST gap are pushed forward by the gap.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// The span of a whole local day: local midnight to the next local midnight.
///
/// Lasts 23 or 25 hours on DST transition days.
pub fn local_day_span(date: NaiveDate, tz: Tz) -> TimeSpan {
    let next = date.succ_opt().unwrap_or(date);
    TimeSpan::new(
        local_to_utc(date, NaiveTime::MIN, tz),
        local_to_utc(next, NaiveTime::MIN, tz),
    )
}

/// Local calendar date of `instant` in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Midnight UTC of `date`.
pub fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}
