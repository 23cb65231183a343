//! OAuth2 refresh-token grant and a per-user access-token cache.
//!
//! Users authorize Clock Panda once; afterwards the stored refresh token is
//! exchanged for short-lived access tokens on demand.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CalendarError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// A bearer token and the instant the provider says it stops working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token is still usable at `now` given a safety margin.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now < self.expires_at - margin
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchange a refresh token for a fresh access token.
pub async fn refresh_access_token(
    client: &Client,
    config: &OAuthClientConfig,
    refresh_token: &str,
) -> Result<AccessToken, CalendarError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let resp = client.post(&config.token_url).form(&params).send().await?;
    let status = resp.status();
    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| CalendarError::TokenRefresh(format!("unreadable token response ({status}): {e}")))?;

    if let Some(error) = body.error {
        let detail = body.error_description.unwrap_or_default();
        return Err(CalendarError::TokenRefresh(format!("{error} {detail}").trim().to_string()));
    }

    let token = body
        .access_token
        .ok_or_else(|| CalendarError::TokenRefresh("response has no access_token".into()))?;
    let expires_in = body.expires_in.unwrap_or(3600);

    Ok(AccessToken {
        token,
        expires_at: Utc::now() + Duration::seconds(expires_in),
    })
}

/// Access tokens keyed by user email.
///
/// The lock is held while a refresh runs, so concurrent callers wait for the
/// in-flight refresh instead of issuing their own.
pub struct AccessTokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
    margin: Duration,
}

impl AccessTokenCache {
    pub fn new(margin: Duration) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            margin,
        }
    }

    /// Cached token for `email`, or the result of `refresh` when missing or
    /// about to expire.
    pub fn get_or_refresh<F>(&self, email: &str, now: DateTime<Utc>, refresh: F) -> Result<String, CalendarError>
    where
        F: FnOnce() -> Result<AccessToken, CalendarError>,
    {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = tokens.get(email) {
            if cached.is_valid_at(now, self.margin) {
                return Ok(cached.token.clone());
            }
        }
        debug!(email, "refreshing calendar access token");
        let fresh = refresh()?;
        let token = fresh.token.clone();
        tokens.insert(email.to_string(), fresh);
        Ok(token)
    }

    /// Drop the cached token for `email`, e.g. after the provider rejected it.
    pub fn invalidate(&self, email: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(email);
    }
}

impl Default for AccessTokenCache {
    fn default() -> Self {
        Self::new(Duration::seconds(60))
    }
}
