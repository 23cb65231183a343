//! SQLite storage for users and personal tasks.
//!
//! Provides persistent storage for:
//! - Users with their planning preferences and calendar refresh token
//! - Personal tasks and their recurrence
//!
//! Preferences, recurrence and preferred time ranges are stored as JSON text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CoreError, DatabaseError};
use crate::task::{PersonalTask, PersonalTaskRepository, Recurrence};
use crate::time::LocalTimeRange;
use crate::user::{User, UserPreferences, UserRepository};

use super::data_dir;

/// SQLite database backing the user and personal-task repositories.
pub struct Database {
    conn: Mutex<Connection>,
}

fn corrupt(what: &'static str, err: serde_json::Error) -> DatabaseError {
    DatabaseError::Corrupt {
        what,
        message: err.to_string(),
    }
}

fn to_json<T: serde::Serialize>(what: &'static str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| corrupt(what, e))
}

impl Database {
    /// Open the database at `~/.config/clockpanda/clockpanda.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("clockpanda.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn().execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                email                   TEXT PRIMARY KEY,
                preferences             TEXT,
                calendar_refresh_token  TEXT,
                created_at              TEXT NOT NULL,
                updated_at              TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS personal_tasks (
                id                TEXT PRIMARY KEY,
                owner_email       TEXT NOT NULL REFERENCES users(email) ON DELETE CASCADE,
                title             TEXT NOT NULL,
                description       TEXT,
                duration_minutes  INTEGER NOT NULL,
                recurrence        TEXT NOT NULL,
                preferred_time    TEXT,
                updated_at        TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_personal_tasks_owner ON personal_tasks(owner_email);",
        )?;
        Ok(())
    }

    fn user_from_row(row: &Row<'_>) -> rusqlite::Result<(String, Option<String>, Option<String>)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn decode_user(raw: (String, Option<String>, Option<String>)) -> Result<User, DatabaseError> {
        let (email, preferences, calendar_refresh_token) = raw;
        let preferences = preferences
            .map(|json| serde_json::from_str::<UserPreferences>(&json))
            .transpose()
            .map_err(|e| corrupt("user", e))?;
        Ok(User {
            email,
            preferences,
            calendar_refresh_token,
        })
    }

    /// Insert or replace a user, keeping the stored refresh token when the
    /// given user carries none.
    pub fn upsert_user(&self, user: &User) -> Result<(), DatabaseError> {
        let preferences = user
            .preferences
            .as_ref()
            .map(|p| to_json("user", p))
            .transpose()?;
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO users (email, preferences, calendar_refresh_token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(email) DO UPDATE SET
                preferences = excluded.preferences,
                calendar_refresh_token = COALESCE(excluded.calendar_refresh_token, users.calendar_refresh_token),
                updated_at = excluded.updated_at",
            params![user.email, preferences, user.calendar_refresh_token, now],
        )?;
        Ok(())
    }

    pub fn get_user(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let raw = self
            .conn()
            .query_row(
                "SELECT email, preferences, calendar_refresh_token FROM users WHERE email = ?1",
                params![email],
                Self::user_from_row,
            )
            .optional()?;
        raw.map(Self::decode_user).transpose()
    }

    pub fn set_refresh_token(&self, email: &str, token: Option<&str>) -> Result<bool, DatabaseError> {
        let changed = self.conn().execute(
            "UPDATE users SET calendar_refresh_token = ?2, updated_at = ?3 WHERE email = ?1",
            params![email, token, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_user(&self, email: &str) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute("DELETE FROM users WHERE email = ?1", params![email])?;
        Ok(changed > 0)
    }

    pub fn upsert_personal_task(&self, task: &PersonalTask) -> Result<(), DatabaseError> {
        let recurrence = to_json("personal task", &task.recurrence)?;
        let preferred_time = task
            .preferred_time
            .as_ref()
            .map(|r| to_json("personal task", r))
            .transpose()?;
        self.conn().execute(
            "INSERT OR REPLACE INTO personal_tasks
                (id, owner_email, title, description, duration_minutes, recurrence, preferred_time, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id,
                task.owner_email,
                task.title,
                task.description,
                task.duration_minutes,
                recurrence,
                preferred_time,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_personal_task(&self, id: &str) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute("DELETE FROM personal_tasks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

type TaskRow = (String, String, String, Option<String>, u32, String, Option<String>);

fn decode_task(raw: TaskRow) -> Result<PersonalTask, DatabaseError> {
    let (id, owner_email, title, description, duration_minutes, recurrence, preferred_time) = raw;
    let recurrence: Recurrence = serde_json::from_str(&recurrence).map_err(|e| corrupt("personal task", e))?;
    let preferred_time = preferred_time
        .map(|json| serde_json::from_str::<LocalTimeRange>(&json))
        .transpose()
        .map_err(|e| corrupt("personal task", e))?;
    Ok(PersonalTask {
        id,
        owner_email,
        title,
        description,
        duration_minutes,
        recurrence,
        preferred_time,
    })
}

impl UserRepository for Database {
    fn list(&self) -> Result<Vec<User>, DatabaseError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT email, preferences, calendar_refresh_token FROM users ORDER BY email")?;
        let rows = stmt.query_map([], Self::user_from_row)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(Self::decode_user(row?)?);
        }
        Ok(users)
    }
}

impl PersonalTaskRepository for Database {
    fn list_by_user_email(&self, email: &str) -> Result<Vec<PersonalTask>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, owner_email, title, description, duration_minutes, recurrence, preferred_time
             FROM personal_tasks
             WHERE owner_email = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![email], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(decode_task(row?)?);
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn alice() -> User {
        let mut prefs = UserPreferences::new(chrono_tz::Europe::Berlin, 20);
        prefs.set_working_hours(Weekday::Mon, LocalTimeRange::parse("09:00-17:00").unwrap());
        prefs.preferred_focus_time_range = Some(LocalTimeRange::parse("09:00-12:00").unwrap());
        User::new("alice@example.com").with_preferences(prefs)
    }

    fn gym() -> PersonalTask {
        PersonalTask {
            id: "gym".into(),
            owner_email: "alice@example.com".into(),
            title: "Gym".into(),
            description: Some("Leg day".into()),
            duration_minutes: 60,
            recurrence: Recurrence::Weekly {
                days: vec![Weekday::Tue, Weekday::Thu],
            },
            preferred_time: Some(LocalTimeRange::parse("17:00-20:00").unwrap()),
        }
    }

    #[test]
    fn users_roundtrip_with_preferences() {
        let db = Database::open_memory().unwrap();
        db.upsert_user(&alice()).unwrap();
        db.upsert_user(&User::new("bob@example.com")).unwrap();

        let users = db.list().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0], alice());
        assert!(users[1].preferences.is_none());
    }

    #[test]
    fn upsert_keeps_existing_refresh_token() {
        let db = Database::open_memory().unwrap();
        db.upsert_user(&alice()).unwrap();
        assert!(db.set_refresh_token("alice@example.com", Some("r1")).unwrap());
        db.upsert_user(&alice()).unwrap();
        let stored = db.get_user("alice@example.com").unwrap().unwrap();
        assert_eq!(stored.calendar_refresh_token.as_deref(), Some("r1"));
        assert!(!db.set_refresh_token("nobody@example.com", Some("r")).unwrap());
    }

    #[test]
    fn personal_tasks_are_listed_per_owner() {
        let db = Database::open_memory().unwrap();
        db.upsert_user(&alice()).unwrap();
        db.upsert_personal_task(&gym()).unwrap();

        assert_eq!(db.list_by_user_email("alice@example.com").unwrap(), vec![gym()]);
        assert!(db.list_by_user_email("bob@example.com").unwrap().is_empty());
        assert!(db.delete_personal_task("gym").unwrap());
        assert!(db.list_by_user_email("alice@example.com").unwrap().is_empty());
    }

    #[test]
    fn deleting_user_cascades_to_tasks() {
        let db = Database::open_memory().unwrap();
        db.upsert_user(&alice()).unwrap();
        db.upsert_personal_task(&gym()).unwrap();
        assert!(db.delete_user("alice@example.com").unwrap());
        assert!(db.list_by_user_email("alice@example.com").unwrap().is_empty());
    }

    #[test]
    fn task_for_unknown_owner_is_rejected() {
        let db = Database::open_memory().unwrap();
        assert!(db.upsert_personal_task(&gym()).is_err());
    }

    #[test]
    fn corrupt_preferences_surface_as_error() {
        let db = Database::open_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO users (email, preferences, created_at, updated_at) VALUES ('x@example.com', '{oops', '', '')",
                [],
            )
            .unwrap();
        assert!(matches!(db.list(), Err(DatabaseError::Corrupt { .. })));
    }
}
