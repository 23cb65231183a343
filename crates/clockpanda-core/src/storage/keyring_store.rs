//! Thin wrapper around the OS keyring for OAuth client credentials.

use crate::error::ConfigError;

const SERVICE: &str = "clockpanda";

pub const GOOGLE_CLIENT_ID: &str = "google_client_id";
pub const GOOGLE_CLIENT_SECRET: &str = "google_client_secret";

fn keyring_error(key: &str, err: keyring::Error) -> ConfigError {
    ConfigError::LoadFailed {
        path: format!("keyring:{SERVICE}/{key}").into(),
        message: err.to_string(),
    }
}

pub fn get(key: &str) -> Result<Option<String>, ConfigError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(|e| keyring_error(key, e))?;
    match entry.get_password() {
        Ok(pw) => Ok(Some(pw)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(key, e)),
    }
}

pub fn set(key: &str, value: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(|e| keyring_error(key, e))?;
    entry
        .set_password(value)
        .map_err(|e| ConfigError::SaveFailed {
            path: format!("keyring:{SERVICE}/{key}").into(),
            message: e.to_string(),
        })
}

pub fn delete(key: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(SERVICE, key).map_err(|e| keyring_error(key, e))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(key, e)),
    }
}
