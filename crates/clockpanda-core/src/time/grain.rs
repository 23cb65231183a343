//! The 15-minute planning grid.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use super::TimeSpan;

/// Length of one grain in minutes.
pub const GRAIN_LENGTH_MINUTES: i64 = 15;

/// Smallest addressable planning slot. Ordered and compared by start instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeGrain {
    pub start: DateTime<Utc>,
}

impl TimeGrain {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { start }
    }

    pub fn length() -> Duration {
        Duration::minutes(GRAIN_LENGTH_MINUTES)
    }

    /// Grain starting at `instant` rounded down to the grid.
    pub fn containing(instant: DateTime<Utc>) -> Self {
        let start = instant
            .duration_trunc(Self::length())
            .unwrap_or(instant);
        Self { start }
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + Self::length()
    }

    /// Grain `n` steps later (or earlier for negative `n`).
    pub fn offset(&self, n: i64) -> Self {
        Self {
            start: self.start + Duration::minutes(GRAIN_LENGTH_MINUTES * n),
        }
    }

    /// Every grain starting inside `range`, in order.
    pub fn generate(range: &TimeSpan) -> Vec<TimeGrain> {
        let mut grains = Vec::new();
        let mut cursor = range.start;
        while cursor < range.end {
            grains.push(TimeGrain::new(cursor));
            cursor += Self::length();
        }
        grains
    }
}

/// Number of whole grains needed to cover `minutes`.
pub fn grains_for_minutes(minutes: i64) -> u32 {
    if minutes <= 0 {
        return 0;
    }
    ((minutes + GRAIN_LENGTH_MINUTES - 1) / GRAIN_LENGTH_MINUTES) as u32
}
