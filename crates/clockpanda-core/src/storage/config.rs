//! TOML-based application configuration.
//!
//! Stores:
//! - Planning horizon and solver settings
//! - Calendar provider endpoints
//! - How created focus-time events are labelled
//!
//! Configuration is stored at `~/.config/clockpanda/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::calendar::{DEFAULT_API_BASE_URL, DEFAULT_TOKEN_URL};
use crate::error::ConfigError;

/// Planning horizon, solver and scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    #[serde(default = "default_max_range_weeks")]
    pub max_range_weeks: u32,
    /// Day weekly buckets start on, e.g. `monday`.
    #[serde(default = "default_week_start")]
    pub week_start: String,
    #[serde(default = "default_solver_time_budget_secs")]
    pub solver_time_budget_secs: u64,
    #[serde(default = "default_late_acceptance_size")]
    pub late_acceptance_size: usize,
    /// Fixed seed for reproducible solves; random when unset.
    #[serde(default)]
    pub solver_seed: Option<u64>,
    #[serde(default = "default_cron_interval_minutes")]
    pub cron_interval_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_token_expiry_margin_secs")]
    pub token_expiry_margin_secs: i64,
}

/// Labels written onto events Clock Panda creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusTimeConfig {
    #[serde(default = "default_focus_title")]
    pub title: String,
    #[serde(default = "default_focus_description")]
    pub description: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/clockpanda/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub focus_time: FocusTimeConfig,
}

fn default_max_range_weeks() -> u32 {
    2
}
fn default_week_start() -> String {
    "monday".into()
}
fn default_solver_time_budget_secs() -> u64 {
    10
}
fn default_late_acceptance_size() -> usize {
    400
}
fn default_cron_interval_minutes() -> u64 {
    30
}
fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.into()
}
fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.into()
}
fn default_token_expiry_margin_secs() -> i64 {
    60
}
fn default_focus_title() -> String {
    "Focus Time".into()
}
fn default_focus_description() -> String {
    "Scheduled by Clock Panda".into()
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_range_weeks: default_max_range_weeks(),
            week_start: default_week_start(),
            solver_time_budget_secs: default_solver_time_budget_secs(),
            late_acceptance_size: default_late_acceptance_size(),
            solver_seed: None,
            cron_interval_minutes: default_cron_interval_minutes(),
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            token_expiry_margin_secs: default_token_expiry_margin_secs(),
        }
    }
}

impl Default for FocusTimeConfig {
    fn default() -> Self {
        Self {
            title: default_focus_title(),
            description: default_focus_description(),
        }
    }
}

impl OptimizationConfig {
    pub fn week_start_day(&self) -> Result<Weekday, ConfigError> {
        self.week_start
            .parse::<Weekday>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "optimization.week_start".into(),
                message: format!("'{}' is not a day of the week", self.week_start),
            })
    }
}

impl Config {
    fn get_json_value_by_path<'a>(root: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(invalid("config key is empty".into()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(format!("cannot parse '{value}' as bool: {e}")))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if value == "none" {
                            serde_json::Value::Null
                        } else if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    // Optional values: "none" clears, anything else is taken as JSON or text.
                    serde_json::Value::Null => match value {
                        "none" | "" => serde_json::Value::Null,
                        other => serde_json::from_str(other)
                            .unwrap_or_else(|_| serde_json::Value::String(other.into())),
                    },
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::String(_) => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config file location.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("~/.config/clockpanda"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Reject values the planner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let opt = &self.optimization;
        opt.week_start_day()?;
        if opt.max_range_weeks == 0 {
            return Err(ConfigError::InvalidValue {
                key: "optimization.max_range_weeks".into(),
                message: "must be at least 1".into(),
            });
        }
        if opt.late_acceptance_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "optimization.late_acceptance_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if opt.cron_interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "optimization.cron_interval_minutes".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. The change is validated but
    /// not persisted; call [`Config::save`] afterwards.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value does not fit it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
