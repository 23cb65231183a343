mod config;
pub mod database;
pub mod keyring_store;

pub use config::{Config, FocusTimeConfig, GoogleConfig, OptimizationConfig};
pub use database::Database;

use std::path::PathBuf;

/// Returns `~/.config/clockpanda[-dev]/` based on CLOCKPANDA_ENV.
///
/// Set CLOCKPANDA_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CLOCKPANDA_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("clockpanda-dev")
    } else {
        base_dir.join("clockpanda")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
