//! Outbound transports.
//!
//! Both transports sit behind [`ProviderAdapter`]; the dispatcher picks one
//! per run through a [`ProviderFactory`] and never branches on auth mode
//! itself.
//!
//! ```text
//! SenderConfig::OAuth → TokenManager → ApiSender
//! SenderConfig::Smtp  →                SmtpSender
//! ```

pub mod api;
pub mod html;
pub mod smtp;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::config::Config;
use crate::credentials::{SenderConfig, TokenManager};
use crate::error::{AuthError, SendError};

pub use api::ApiSender;
pub use smtp::SmtpSender;

/// One rendered message for one recipient.
#[derive(Debug, Clone, Copy)]
pub struct OutboundMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub html_body: &'a str,
    /// Hosted attachment URLs, linked inline
    pub attachments: &'a [String],
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Send one message and return the provider's message id.
    async fn send(&self, message: &OutboundMessage<'_>) -> Result<String, SendError>;
}

/// Builds the adapter for one dispatch run.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn connect(&self, config: &SenderConfig) -> Result<Box<dyn ProviderAdapter>, AuthError>;
}

/// Factory for the real Zoho API and SMTP transports.
#[derive(Clone)]
pub struct LiveProviders {
    client: Client,
    tokens: TokenManager,
    api_base: String,
    smtp_host: String,
    smtp_port: u16,
    timeout: Duration,
}

impl LiveProviders {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            tokens: TokenManager::new(client.clone(), &config.accounts_url),
            client,
            api_base: config.api_base.clone(),
            smtp_host: config.smtp_host.clone(),
            smtp_port: config.smtp_port,
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

#[async_trait]
impl ProviderFactory for LiveProviders {
    async fn connect(&self, config: &SenderConfig) -> Result<Box<dyn ProviderAdapter>, AuthError> {
        let adapter: Box<dyn ProviderAdapter> = match config {
            SenderConfig::OAuth(oauth) => {
                if oauth.account_id.trim().is_empty() {
                    return Err(AuthError::MissingField("account_id"));
                }
                let token = self.tokens.get_access_token(oauth).await?;
                Box::new(ApiSender::new(
                    self.client.clone(),
                    &self.api_base,
                    &oauth.account_id,
                    token,
                    self.timeout,
                ))
            }
            SenderConfig::Smtp(smtp) => {
                if smtp.from_email.trim().is_empty() {
                    return Err(AuthError::MissingField("from_email"));
                }
                if smtp.app_password.trim().is_empty() {
                    return Err(AuthError::MissingField("app_password"));
                }
                Box::new(SmtpSender::new(
                    &self.smtp_host,
                    self.smtp_port,
                    smtp,
                    self.timeout,
                )?)
            }
        };

        info!(
            transport = adapter.name(),
            auth_mode = config.auth_mode().as_str(),
            "provider_selected"
        );

        Ok(adapter)
    }
}
