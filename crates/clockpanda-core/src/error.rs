//! Core error types for clockpanda-core.
//!
//! This module defines the error hierarchy using thiserror. Every fallible
//! operation returns one of these explicitly; panics are reserved for
//! invariant violations (bugs).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for clockpanda-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Calendar provider errors
    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Optimization run errors
    #[error("Optimization error: {0}")]
    Optimization(#[from] OptimizationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt {what} row: {message}")]
    Corrupt { what: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Errors raised by a calendar facade.
#[derive(Error, Debug)]
pub enum CalendarError {
    /// No refresh token stored for the user
    #[error("Not authenticated with the calendar provider for {email}")]
    NotAuthenticated { email: String },

    /// The OAuth refresh-token grant failed
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Transport-level failure
    #[error("Calendar request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Calendar API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider payload could not be interpreted
    #[error("Could not decode calendar payload: {0}")]
    Decode(String),

    /// Attempt to modify an event Clock Panda does not own
    #[error("Refusing to modify external event {event_id}")]
    ExternalEventNotModifiable { event_id: String },

    /// Event no longer exists
    #[error("Calendar event {event_id} not found")]
    NotFound { event_id: String },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// More than one working-hour block for a day
    #[error("Only one working-hours block is supported per day, got several for {day}")]
    DuplicateWorkingHours { day: chrono::Weekday },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors raised by the solver engine.
#[derive(Error, Debug)]
pub enum SolverError {
    /// The problem handed to the solver is not solvable as posed
    #[error("Invalid optimization problem: {0}")]
    InvalidProblem(String),

    /// The solve call panicked
    #[error("Solver panicked: {0}")]
    Panicked(String),
}

/// Stage of a per-user optimization run, used for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ListUsers,
    ListEvents,
    ListTasks,
    Solve,
    Sync,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::ListUsers => "list-users",
            Stage::ListEvents => "list-events",
            Stage::ListTasks => "list-tasks",
            Stage::Solve => "solve",
            Stage::Sync => "sync",
        };
        f.write_str(s)
    }
}

/// Recoverable failures of an optimization run.
#[derive(Error, Debug)]
pub enum OptimizationError {
    /// Users or tasks could not be read
    #[error("Data source error: {0}")]
    DataSource(#[from] DatabaseError),

    /// User has not configured preferences yet
    #[error("User {email} has no preferences")]
    MissingPreferences { email: String },

    /// Calendar facade failure while running a stage for a user
    #[error("Calendar failure for {email} during {stage}: {source}")]
    Calendar {
        email: String,
        stage: Stage,
        #[source]
        source: CalendarError,
    },

    /// Solver failure for a user
    #[error("Solver failure for {email}: {source}")]
    Solver {
        email: String,
        #[source]
        source: SolverError,
    },
}

impl OptimizationError {
    /// Email of the affected user, if the failure is user-scoped.
    pub fn email(&self) -> Option<&str> {
        match self {
            OptimizationError::DataSource(_) => None,
            OptimizationError::MissingPreferences { email }
            | OptimizationError::Calendar { email, .. }
            | OptimizationError::Solver { email, .. } => Some(email),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimization_error_exposes_email() {
        let err = OptimizationError::MissingPreferences {
            email: "a@example.com".into(),
        };
        assert_eq!(err.email(), Some("a@example.com"));

        let err = OptimizationError::DataSource(DatabaseError::Locked);
        assert_eq!(err.email(), None);
    }

    #[test]
    fn calendar_error_message_names_stage() {
        let err = OptimizationError::Calendar {
            email: "a@example.com".into(),
            stage: Stage::ListEvents,
            source: CalendarError::NotFound {
                event_id: "x".into(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("list-events"));
        assert!(msg.contains("a@example.com"));
    }
}
