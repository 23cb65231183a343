//! Users and their planning preferences.

use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, ValidationError};
use crate::time::{LocalTimeRange, TimeSpan};

/// A single working-hours block for one day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHoursBlock {
    pub day: Weekday,
    #[serde(flatten)]
    pub hours: LocalTimeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub timezone: Tz,
    /// At most one block per day; days without a block are unconstrained.
    #[serde(default)]
    pub working_hours: Vec<WorkingHoursBlock>,
    pub target_focus_time_hours_per_week: u32,
    pub preferred_focus_time_range: Option<LocalTimeRange>,
}

impl UserPreferences {
    pub fn new(timezone: Tz, target_focus_time_hours_per_week: u32) -> Self {
        Self {
            timezone,
            working_hours: Vec::new(),
            target_focus_time_hours_per_week,
            preferred_focus_time_range: None,
        }
    }

    /// Replace the block for `day`.
    pub fn set_working_hours(&mut self, day: Weekday, hours: LocalTimeRange) {
        self.working_hours.retain(|b| b.day != day);
        self.working_hours.push(WorkingHoursBlock { day, hours });
    }

    pub fn clear_working_hours(&mut self, day: Weekday) {
        self.working_hours.retain(|b| b.day != day);
    }

    pub fn working_hours_for(&self, day: Weekday) -> Option<LocalTimeRange> {
        self.working_hours
            .iter()
            .find(|b| b.day == day)
            .map(|b| b.hours)
    }

    /// Concrete working-hours span for a local date, if that weekday has one.
    pub fn working_hours_on(&self, date: NaiveDate) -> Option<TimeSpan> {
        use chrono::Datelike;
        self.working_hours_for(date.weekday())
            .map(|hours| hours.on(date, self.timezone))
    }

    pub fn target_focus_time_minutes_per_week(&self) -> i64 {
        i64::from(self.target_focus_time_hours_per_week) * 60
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (i, block) in self.working_hours.iter().enumerate() {
            if self.working_hours[..i].iter().any(|b| b.day == block.day) {
                return Err(ValidationError::DuplicateWorkingHours { day: block.day });
            }
        }
        if self.target_focus_time_hours_per_week > 7 * 24 {
            return Err(ValidationError::InvalidValue {
                field: "target_focus_time_hours_per_week".into(),
                message: format!("{} exceeds the hours in a week", self.target_focus_time_hours_per_week),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub preferences: Option<UserPreferences>,
    /// OAuth refresh token for the user's calendar. Never serialized out.
    #[serde(default, skip_serializing)]
    pub calendar_refresh_token: Option<String>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            preferences: None,
            calendar_refresh_token: None,
        }
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }
}

/// Read access to users.
pub trait UserRepository: Send + Sync {
    fn list(&self) -> Result<Vec<User>, DatabaseError>;
}

impl<T: UserRepository + ?Sized> UserRepository for std::sync::Arc<T> {
    fn list(&self) -> Result<Vec<User>, DatabaseError> {
        (**self).list()
    }
}
