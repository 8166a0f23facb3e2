//! Three-tier credential resolution.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{
    AccessToken, AuthMode, EnvCredentials, GlobalCredentials, OAuthConfig, SenderConfig,
    SessionRecord, SmtpConfig,
};
use crate::store::CampaignStore;

/// Builds a [`SenderConfig`] from the session record, the global record and
/// environment defaults, in that order.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CampaignStore>,
    defaults: EnvCredentials,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CampaignStore>, defaults: EnvCredentials) -> Self {
        Self { store, defaults }
    }

    /// Resolve the sender configuration for one run. Never fails: with no
    /// configured source the result is an empty OAuth config, which the
    /// token manager then rejects.
    pub async fn resolve(&self) -> SenderConfig {
        self.resolve_at(Utc::now()).await
    }

    pub async fn resolve_at(&self, now: DateTime<Utc>) -> SenderConfig {
        let session = match self.store.session_credentials().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "credentials_session_read_failed");
                None
            }
        };

        if let Some(session) = session.filter(|s| s.is_active(now)) {
            info!(source = "session", auth_mode = "oauth", "credentials_resolved");
            return SenderConfig::OAuth(self.from_session(session));
        }

        let global = match self.store.global_credentials().await {
            Ok(global) => global,
            Err(e) => {
                warn!(error = %e, "credentials_global_read_failed");
                None
            }
        };

        if let Some(global) = global {
            let config = self.from_global(global);
            info!(
                source = "global",
                auth_mode = config.auth_mode().as_str(),
                "credentials_resolved"
            );
            return config;
        }

        let config = self.from_env();
        info!(
            source = "env",
            auth_mode = config.auth_mode().as_str(),
            "credentials_resolved"
        );
        config
    }

    fn from_session(&self, session: SessionRecord) -> OAuthConfig {
        let d = &self.defaults;
        OAuthConfig {
            client_id: or_default(None, &d.client_id),
            client_secret: or_default(None, &d.client_secret),
            refresh_token: or_default(session.refresh_token, &d.refresh_token),
            account_id: or_default(session.account_id, &d.account_id),
            from_email: or_default(session.email, &d.from_email),
            session_token: Some(AccessToken::new(session.access_token, session.expires_at)),
        }
    }

    fn from_global(&self, global: GlobalCredentials) -> SenderConfig {
        let d = &self.defaults;
        match global.auth_mode {
            AuthMode::Smtp => SenderConfig::Smtp(SmtpConfig {
                from_email: or_default(global.from_email, &d.from_email),
                app_password: or_default(global.app_password, &d.app_password),
            }),
            AuthMode::OAuth => SenderConfig::OAuth(OAuthConfig {
                client_id: or_default(global.client_id, &d.client_id),
                client_secret: or_default(global.client_secret, &d.client_secret),
                refresh_token: or_default(global.refresh_token, &d.refresh_token),
                account_id: or_default(None, &d.account_id),
                from_email: or_default(global.from_email, &d.from_email),
                session_token: None,
            }),
        }
    }

    fn from_env(&self) -> SenderConfig {
        let d = &self.defaults;

        // SMTP only when the environment has an app password and nothing to
        // refresh an OAuth token with.
        if d.refresh_token.is_none() && d.app_password.is_some() {
            return SenderConfig::Smtp(SmtpConfig {
                from_email: or_default(None, &d.from_email),
                app_password: or_default(None, &d.app_password),
            });
        }

        SenderConfig::OAuth(OAuthConfig {
            client_id: or_default(None, &d.client_id),
            client_secret: or_default(None, &d.client_secret),
            refresh_token: or_default(None, &d.refresh_token),
            account_id: or_default(None, &d.account_id),
            from_email: or_default(None, &d.from_email),
            session_token: None,
        })
    }
}

fn or_default(value: Option<String>, default: &Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| default.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{GLOBAL_CONFIG_ID, SESSION_CONFIG_ID};
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn env_defaults() -> EnvCredentials {
        EnvCredentials {
            client_id: Some("env-client".to_string()),
            client_secret: Some("env-secret".to_string()),
            refresh_token: Some("env-refresh".to_string()),
            account_id: Some("env-account".to_string()),
            from_email: Some("env@example.com".to_string()),
            app_password: None,
            imap_user: None,
        }
    }

    fn session(expires_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            config_id: SESSION_CONFIG_ID.to_string(),
            access_token: "session-token".to_string(),
            refresh_token: Some("session-refresh".to_string()),
            expires_at,
            account_id: Some("session-account".to_string()),
            email: Some("session@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn test_env_only_resolves_oauth_from_env() {
        let store = Arc::new(MemoryStore::new());
        let resolver = CredentialResolver::new(store, env_defaults());

        let config = resolver.resolve().await;

        assert_eq!(config.auth_mode(), AuthMode::OAuth);
        match config {
            SenderConfig::OAuth(c) => {
                assert_eq!(c.client_id, "env-client");
                assert_eq!(c.client_secret, "env-secret");
                assert_eq!(c.refresh_token, "env-refresh");
                assert_eq!(c.account_id, "env-account");
                assert_eq!(c.from_email, "env@example.com");
                assert!(c.session_token.is_none());
            }
            other => panic!("Expected OAuth, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_active_session_preferred() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.set_session(session(now + Duration::minutes(30))).await;
        store
            .set_global(GlobalCredentials {
                config_id: GLOBAL_CONFIG_ID.to_string(),
                auth_mode: AuthMode::Smtp,
                client_id: None,
                client_secret: None,
                refresh_token: None,
                from_email: Some("global@example.com".to_string()),
                app_password: Some("pw".to_string()),
            })
            .await;
        let resolver = CredentialResolver::new(store, env_defaults());

        match resolver.resolve_at(now).await {
            SenderConfig::OAuth(c) => {
                assert_eq!(c.session_token.as_ref().map(|t| t.secret()), Some("session-token"));
                assert_eq!(c.account_id, "session-account");
                assert_eq!(c.from_email, "session@example.com");
            }
            other => panic!("Expected OAuth, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expired_session_falls_through_to_global() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.set_session(session(now - Duration::minutes(1))).await;
        store
            .set_global(GlobalCredentials {
                config_id: GLOBAL_CONFIG_ID.to_string(),
                auth_mode: AuthMode::Smtp,
                client_id: None,
                client_secret: None,
                refresh_token: None,
                from_email: Some("global@example.com".to_string()),
                app_password: Some("pw".to_string()),
            })
            .await;
        let resolver = CredentialResolver::new(store, env_defaults());

        match resolver.resolve_at(now).await {
            SenderConfig::Smtp(c) => {
                assert_eq!(c.from_email, "global@example.com");
                assert_eq!(c.app_password, "pw");
            }
            other => panic!("Expected Smtp, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_global_oauth_fills_gaps_from_env() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_global(GlobalCredentials {
                config_id: GLOBAL_CONFIG_ID.to_string(),
                auth_mode: AuthMode::OAuth,
                client_id: Some("global-client".to_string()),
                client_secret: Some("".to_string()),
                refresh_token: Some("global-refresh".to_string()),
                from_email: None,
                app_password: None,
            })
            .await;
        let resolver = CredentialResolver::new(store, env_defaults());

        match resolver.resolve().await {
            SenderConfig::OAuth(c) => {
                assert_eq!(c.client_id, "global-client");
                assert_eq!(c.client_secret, "env-secret");
                assert_eq!(c.refresh_token, "global-refresh");
                assert_eq!(c.account_id, "env-account");
                assert_eq!(c.from_email, "env@example.com");
            }
            other => panic!("Expected OAuth, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_env_app_password_without_refresh_token_uses_smtp() {
        let store = Arc::new(MemoryStore::new());
        let defaults = EnvCredentials {
            from_email: Some("env@example.com".to_string()),
            app_password: Some("app-pw".to_string()),
            ..Default::default()
        };
        let resolver = CredentialResolver::new(store, defaults);

        assert_eq!(resolver.resolve().await.auth_mode(), AuthMode::Smtp);
    }

    #[tokio::test]
    async fn test_nothing_configured_degrades_to_empty_oauth() {
        let store = Arc::new(MemoryStore::new());
        let resolver = CredentialResolver::new(store, EnvCredentials::default());

        match resolver.resolve().await {
            SenderConfig::OAuth(c) => {
                assert!(c.refresh_token.is_empty());
                assert!(c.from_email.is_empty());
            }
            other => panic!("Expected OAuth, got {:?}", other),
        }
    }
}
