//! Sender credentials.
//!
//! A [`SenderConfig`] is resolved once per dispatch run and passed down by
//! value; nothing here is cached between runs.
//!
//! ## Resolution order
//!
//! ```text
//! current_session (unexpired token) → zoho_global record → environment
//! ```

pub mod resolver;
pub mod token;

use std::env;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use resolver::CredentialResolver;
pub use token::{AccessToken, TokenManager};

/// Config id of the session record written by the OAuth login flow.
pub const SESSION_CONFIG_ID: &str = "current_session";

/// Config id of the persisted global credential record.
pub const GLOBAL_CONFIG_ID: &str = "zoho_global";

/// Transport/credential strategy for a sender identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    OAuth,
    Smtp,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::OAuth => "oauth",
            AuthMode::Smtp => "smtp",
        }
    }
}

// =============================================================================
// Resolved configuration
// =============================================================================

/// Immutable sender configuration for one dispatch run.
#[derive(Clone, PartialEq)]
pub enum SenderConfig {
    OAuth(OAuthConfig),
    Smtp(SmtpConfig),
}

impl SenderConfig {
    pub fn auth_mode(&self) -> AuthMode {
        match self {
            SenderConfig::OAuth(_) => AuthMode::OAuth,
            SenderConfig::Smtp(_) => AuthMode::Smtp,
        }
    }

    pub fn from_email(&self) -> &str {
        match self {
            SenderConfig::OAuth(c) => &c.from_email,
            SenderConfig::Smtp(c) => &c.from_email,
        }
    }
}

impl fmt::Debug for SenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderConfig::OAuth(c) => f
                .debug_struct("OAuth")
                .field("client_id", &c.client_id)
                .field("account_id", &c.account_id)
                .field("from_email", &c.from_email)
                .field("has_refresh_token", &!c.refresh_token.is_empty())
                .field("has_session_token", &c.session_token.is_some())
                .finish(),
            SenderConfig::Smtp(c) => f
                .debug_struct("Smtp")
                .field("from_email", &c.from_email)
                .field("has_app_password", &!c.app_password.is_empty())
                .finish(),
        }
    }
}

#[derive(Clone, PartialEq, Default)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub account_id: String,
    pub from_email: String,
    /// Still-valid token taken from the session record; skips the refresh.
    pub session_token: Option<AccessToken>,
}

#[derive(Clone, PartialEq, Default)]
pub struct SmtpConfig {
    pub from_email: String,
    pub app_password: String,
}

// =============================================================================
// Stored credential records
// =============================================================================

/// Session record written after an interactive OAuth login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub config_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl SessionRecord {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at > now
    }
}

/// Persisted global credential record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalCredentials {
    pub config_id: String,
    #[serde(default)]
    pub auth_mode: AuthMode,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub app_password: Option<String>,
}

/// Process-level credential defaults.
#[derive(Clone, Default, PartialEq)]
pub struct EnvCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
    pub from_email: Option<String>,
    pub app_password: Option<String>,
    pub imap_user: Option<String>,
}

impl EnvCredentials {
    pub fn from_env() -> Self {
        EnvCredentials {
            client_id: non_empty_var("ZOHO_CLIENT_ID"),
            client_secret: non_empty_var("ZOHO_CLIENT_SECRET"),
            refresh_token: non_empty_var("ZOHO_REFRESH_TOKEN"),
            account_id: non_empty_var("ZOHO_ACCOUNT_ID"),
            from_email: non_empty_var("SOURCE_EMAIL"),
            app_password: non_empty_var("ZOHO_APP_PASSWORD"),
            imap_user: non_empty_var("IMAP_USER"),
        }
    }
}

impl fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("client_id_set", &self.client_id.is_some())
            .field("client_secret_set", &self.client_secret.is_some())
            .field("refresh_token_set", &self.refresh_token.is_some())
            .field("account_id", &self.account_id)
            .field("from_email", &self.from_email)
            .field("app_password_set", &self.app_password.is_some())
            .field("imap_user", &self.imap_user)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
