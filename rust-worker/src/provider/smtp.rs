//! SMTP transport (implicit TLS, app password).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::html::{to_plain_text, with_inline_images};
use super::{OutboundMessage, ProviderAdapter};
use crate::credentials::SmtpConfig;
use crate::error::{AuthError, SendError};

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    /// Build a pooled transport. Nothing connects until the first send.
    pub fn new(
        host: &str,
        port: u16,
        config: &SmtpConfig,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| AuthError::Transport(format!("SMTP relay {}: {}", host, e)))?
            .port(port)
            .credentials(Credentials::new(
                config.from_email.clone(),
                config.app_password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl ProviderAdapter for SmtpSender {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &OutboundMessage<'_>) -> Result<String, SendError> {
        let from: Mailbox = message
            .from
            .parse()
            .map_err(|_| SendError::InvalidAddress(message.from.to_string()))?;
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| SendError::InvalidAddress(message.to.to_string()))?;

        let message_id = generate_message_id(message.to, sender_domain(message.from));
        let html = with_inline_images(message.html_body, message.attachments);

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject)
            .message_id(Some(format!("<{}>", message_id)))
            .multipart(MultiPart::alternative_plain_html(to_plain_text(&html), html))
            .map_err(|e| SendError::Smtp(e.to_string()))?;

        if let Err(e) = self.transport.send(email).await {
            warn!(to = %message.to, error = %e, "smtp_send_failed");
            return Err(SendError::Smtp(e.to_string()));
        }

        info!(to = %message.to, message_id = %message_id, "smtp_send_complete");

        Ok(message_id)
    }
}

fn sender_domain(from: &str) -> &str {
    from.rsplit_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>'))
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost")
}

/// Unique `Message-ID` local part + domain, without angle brackets.
fn generate_message_id(to: &str, domain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(to.as_bytes());
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    hasher.update(rand::thread_rng().gen::<u64>().to_be_bytes());
    let hash = hex::encode(hasher.finalize());

    format!("{}@{}", &hash[..32], domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_message_id_unique() {
        let a = generate_message_id("a@example.com", "news.example.com");
        let b = generate_message_id("a@example.com", "news.example.com");

        assert_ne!(a, b);
        assert!(a.ends_with("@news.example.com"));
        assert!(a.split('@').next().unwrap().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sender_domain() {
        assert_eq!(sender_domain("news@example.com"), "example.com");
        assert_eq!(sender_domain("News <news@example.com>"), "example.com");
        assert_eq!(sender_domain("broken"), "localhost");
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_send_error() {
        let sender = SmtpSender::new(
            "smtp.example.com",
            465,
            &SmtpConfig {
                from_email: "news@example.com".to_string(),
                app_password: "pw".to_string(),
            },
            Duration::from_secs(1),
        )
        .unwrap();

        let result = sender
            .send(&OutboundMessage {
                from: "news@example.com",
                to: "not-an-address",
                subject: "Hi",
                html_body: "<p>Hi</p>",
                attachments: &[],
            })
            .await;

        assert!(matches!(result, Err(SendError::InvalidAddress(_))));
    }
}
