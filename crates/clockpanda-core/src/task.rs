//! Personal tasks: recurring chores the planner places alongside focus time.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, ValidationError};
use crate::time::LocalTimeRange;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recurrence {
    OneOff { date: NaiveDate },
    Daily,
    Weekly { days: Vec<Weekday> },
}

impl Recurrence {
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        match self {
            Recurrence::OneOff { date: d } => *d == date,
            Recurrence::Daily => true,
            Recurrence::Weekly { days } => days.contains(&date.weekday()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalTask {
    pub id: String,
    pub owner_email: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_minutes: u32,
    pub recurrence: Recurrence,
    pub preferred_time: Option<LocalTimeRange>,
}

impl PersonalTask {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.duration_minutes == 0 || self.duration_minutes > 24 * 60 {
            return Err(ValidationError::InvalidValue {
                field: "duration_minutes".into(),
                message: format!("{} is not within 1..=1440", self.duration_minutes),
            });
        }
        if let Recurrence::Weekly { days } = &self.recurrence {
            if days.is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "recurrence".into(),
                    message: "weekly recurrence needs at least one day".into(),
                });
            }
        }
        Ok(())
    }

    /// Occurrence dates between `from` and `until` (exclusive).
    pub fn occurrences(&self, from: NaiveDate, until: NaiveDate) -> Vec<NaiveDate> {
        from.iter_days()
            .take_while(|d| *d < until)
            .filter(|d| self.recurrence.occurs_on(*d))
            .collect()
    }
}

/// Read access to personal tasks.
pub trait PersonalTaskRepository: Send + Sync {
    fn list_by_user_email(&self, email: &str) -> Result<Vec<PersonalTask>, DatabaseError>;
}

impl<T: PersonalTaskRepository + ?Sized> PersonalTaskRepository for std::sync::Arc<T> {
    fn list_by_user_email(&self, email: &str) -> Result<Vec<PersonalTask>, DatabaseError> {
        (**self).list_by_user_email(email)
    }
}
