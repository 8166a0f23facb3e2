//! OAuth access-token acquisition.
//!
//! One refresh per dispatch run: the returned [`AccessToken`] is reused for
//! every recipient in the batch.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::OAuthConfig;
use crate::error::AuthError;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Short-lived bearer credential.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.value.is_empty() && self.expires_at > now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Token endpoint response. Zoho answers 200 with an `error` field on
/// rejected refresh tokens, so both shapes share one struct.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

/// Exchanges refresh tokens for access tokens.
#[derive(Clone)]
pub struct TokenManager {
    client: Client,
    token_url: String,
}

impl TokenManager {
    /// `accounts_url` is the OAuth server root, e.g. `https://accounts.zoho.com`.
    pub fn new(client: Client, accounts_url: &str) -> Self {
        Self {
            client,
            token_url: format!("{}/oauth/v2/token", accounts_url.trim_end_matches('/')),
        }
    }

    /// Return a usable access token for `config`.
    ///
    /// A still-valid session token is returned as-is; otherwise the refresh
    /// token is exchanged once.
    pub async fn get_access_token(&self, config: &OAuthConfig) -> Result<AccessToken, AuthError> {
        if let Some(token) = &config.session_token {
            if token.is_valid_at(Utc::now()) {
                info!(expires_at = %token.expires_at, "access_token_from_session");
                return Ok(token.clone());
            }
        }

        require("client_id", &config.client_id)?;
        require("client_secret", &config.client_secret)?;
        require("refresh_token", &config.refresh_token)?;

        self.refresh(config).await
    }

    async fn refresh(&self, config: &OAuthConfig) -> Result<AccessToken, AuthError> {
        info!(client_id = %config.client_id, "access_token_refresh_start");

        let params = [
            ("refresh_token", config.refresh_token.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "access_token_refresh_rejected");
            return Err(AuthError::Rejected(body));
        }

        let token = parse_token_response(&body, Utc::now())?;

        info!(expires_at = %token.expires_at, "access_token_refresh_complete");

        Ok(token)
    }
}

fn require(field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        warn!(field = field, "access_token_missing_field");
        return Err(AuthError::MissingField(field));
    }
    Ok(())
}

/// Interpret a 2xx token endpoint body.
fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<AccessToken, AuthError> {
    let parsed: TokenResponse =
        serde_json::from_str(body).map_err(|_| AuthError::Rejected(body.to_string()))?;

    if let Some(error) = parsed.error {
        warn!(error = %error, "access_token_refresh_error_body");
        return Err(AuthError::Rejected(body.to_string()));
    }

    match parsed.access_token.filter(|t| !t.is_empty()) {
        Some(value) => Ok(AccessToken::new(value, expiry(now, parsed.expires_in))),
        None => Err(AuthError::Rejected(body.to_string())),
    }
}

/// Expiry instant for `expires_in` seconds from `now`. Non-positive or
/// out-of-range lifetimes fall back to the default.
fn expiry(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    let lifetime = expires_in
        .filter(|secs| *secs > 0)
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime));

    match lifetime {
        Some(at) => at,
        None => {
            if expires_in.is_some() {
                warn!(expires_in = ?expires_in, "access_token_expiry_out_of_range");
            }
            now + chrono::Duration::seconds(DEFAULT_EXPIRES_IN_SECS)
        }
    }
}
