//! Configuration module for environment variable parsing.
//!
//! Every setting has a default so the binaries start with nothing but
//! credentials exported. Invalid numeric values fall back to the default
//! with a warning.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::credentials::EnvCredentials;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Provider REST API base, without the `/accounts/...` suffix
    pub api_base: String,

    /// OAuth accounts server (token refresh endpoint lives under it)
    pub accounts_url: String,

    pub smtp_host: String,
    pub smtp_port: u16,

    pub imap_host: String,
    pub imap_port: u16,

    /// HTTP and SMTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Most recent mailer-daemon messages inspected per scan
    pub scan_limit: usize,

    /// Interval between scheduled scans run by the web server
    pub scan_interval: Duration,

    /// Age after which a `sent` recipient with no bounce counts as delivered
    pub delivery_promotion: Duration,

    /// Optional JSON snapshot used to seed the in-memory store
    pub store_snapshot_path: Option<PathBuf>,

    /// Last-resort sender credentials
    pub credentials: EnvCredentials,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: parse_or("PORT", 8080),

            api_base: env::var("ZOHO_API_BASE")
                .unwrap_or_else(|_| "https://mail.zoho.com/api".to_string()),

            accounts_url: env::var("ZOHO_ACCOUNTS_URL")
                .unwrap_or_else(|_| "https://accounts.zoho.com".to_string()),

            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.zoho.com".to_string()),

            smtp_port: parse_or("SMTP_PORT", 465),

            imap_host: env::var("IMAP_HOST").unwrap_or_else(|_| "imap.zoho.com".to_string()),

            imap_port: parse_or("IMAP_PORT", 993),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 15000),

            scan_limit: parse_or("SCAN_LIMIT", 20),

            scan_interval: parse_secs("SCAN_INTERVAL_SECS", 900),

            delivery_promotion: parse_secs("DELIVERY_PROMOTION_SECS", 3600),

            store_snapshot_path: env::var("STORE_SNAPSHOT_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),

            credentials: EnvCredentials::from_env(),
        }
    }

    /// IMAP login: the mailbox user (falling back to the sender address) and
    /// the app password.
    pub fn mailbox_login(&self) -> (String, String) {
        let user = self
            .credentials
            .imap_user
            .clone()
            .or_else(|| self.credentials.from_email.clone())
            .unwrap_or_default();
        let password = self.credentials.app_password.clone().unwrap_or_default();
        (user, password)
    }
}

/// Parse an env var, warning and falling back on invalid input.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// Parse a whole number of seconds. Zero is rejected.
fn parse_secs(name: &str, default: u64) -> Duration {
    match parse_or(name, default) {
        0 => {
            warn!(env_var = name, "Zero duration, using default");
            Duration::from_secs(default)
        }
        secs => Duration::from_secs(secs),
    }
}
