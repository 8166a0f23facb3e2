//! Zoho Mail REST API transport (OAuth).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::html::with_inline_images;
use super::{OutboundMessage, ProviderAdapter};
use crate::credentials::AccessToken;
use crate::error::SendError;

/// Request body for `POST /accounts/{account_id}/messages`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    from_address: &'a str,
    to_address: &'a str,
    subject: &'a str,
    content: String,
    mail_format: &'static str,
}

/// Sends through the provider's message endpoint with a bearer-style token.
pub struct ApiSender {
    client: Client,
    endpoint: String,
    token: AccessToken,
    timeout: Duration,
}

impl ApiSender {
    pub fn new(
        client: Client,
        api_base: &str,
        account_id: &str,
        token: AccessToken,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/accounts/{}/messages",
                api_base.trim_end_matches('/'),
                account_id
            ),
            token,
            timeout,
        }
    }
}

#[async_trait]
impl ProviderAdapter for ApiSender {
    fn name(&self) -> &'static str {
        "zoho_api"
    }

    async fn send(&self, message: &OutboundMessage<'_>) -> Result<String, SendError> {
        let request = SendMessageRequest {
            from_address: message.from,
            to_address: message.to,
            subject: message.subject,
            content: with_inline_images(message.html_body, message.attachments),
            mail_format: "html",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                "Authorization",
                format!("Zoho-oauthtoken {}", self.token.secret()),
            )
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!(
                to = %message.to,
                status_code = status.as_u16(),
                body_preview = %body.chars().take(200).collect::<String>(),
                "api_send_rejected"
            );
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = extract_message_id(&body).ok_or(SendError::MissingMessageId)?;

        info!(to = %message.to, message_id = %message_id, "api_send_complete");

        Ok(message_id)
    }
}

/// Pull `data.messageId` out of a send response. Zoho returns it as either
/// a string or a number.
fn extract_message_id(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;

    match parsed.pointer("/data/messageId")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Router};
    use std::sync::{Arc, Mutex};

    /// Serve `app` on an ephemeral local port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    /// Provider stub answering every send with `status` and `body`.
    async fn provider(status: StatusCode, body: &'static str) -> String {
        serve(Router::new().route(
            "/accounts/:account_id/messages",
            post(move || async move { (status, body) }),
        ))
        .await
    }

    fn sender(api_base: &str) -> ApiSender {
        ApiSender::new(
            Client::new(),
            api_base,
            "12345",
            AccessToken::new("tok-1", chrono::Utc::now() + chrono::Duration::minutes(5)),
            Duration::from_secs(5),
        )
    }

    fn message() -> OutboundMessage<'static> {
        OutboundMessage {
            from: "news@example.com",
            to: "a@example.com",
            subject: "Hi",
            html_body: "<p>Hi</p>",
            attachments: &[],
        }
    }

    #[tokio::test]
    async fn test_send_returns_message_id_and_sends_token() {
        let seen: Arc<Mutex<Option<(String, serde_json::Value)>>> = Arc::default();
        let captured = seen.clone();
        let base = serve(Router::new().route(
            "/accounts/:account_id/messages",
            post(move |headers: HeaderMap, axum::Json(body): axum::Json<serde_json::Value>| {
                let captured = captured.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    *captured.lock().unwrap() = Some((auth, body));
                    r#"{"data":{"messageId":"1711234567890"}}"#
                }
            }),
        ))
        .await;

        let id = sender(&base).send(&message()).await.unwrap();

        assert_eq!(id, "1711234567890");
        let (auth, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Zoho-oauthtoken tok-1");
        assert_eq!(body["toAddress"], "a@example.com");
        assert_eq!(body["mailFormat"], "html");
    }

    #[tokio::test]
    async fn test_send_non_success_is_rejected() {
        let base = provider(StatusCode::BAD_REQUEST, r#"{"status":{"code":400}}"#).await;

        match sender(&base).send(&message()).await {
            Err(SendError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, r#"{"status":{"code":400}}"#);
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_without_message_id_fails() {
        let base = provider(StatusCode::OK, r#"{"status":{"code":200},"data":{}}"#).await;

        let result = sender(&base).send(&message()).await;

        assert!(matches!(result, Err(SendError::MissingMessageId)));
    }

    #[test]
    fn test_extract_message_id_string() {
        let body = r#"{"status":{"code":200},"data":{"messageId":"1711234567890"}}"#;
        assert_eq!(extract_message_id(body), Some("1711234567890".to_string()));
    }

    #[test]
    fn test_extract_message_id_number() {
        let body = r#"{"data":{"messageId":1711234567890}}"#;
        assert_eq!(extract_message_id(body), Some("1711234567890".to_string()));
    }

    #[test]
    fn test_extract_message_id_missing() {
        assert!(extract_message_id(r#"{"data":{}}"#).is_none());
        assert!(extract_message_id(r#"{"data":{"messageId":""}}"#).is_none());
        assert!(extract_message_id("not json").is_none());
    }

    #[test]
    fn test_endpoint_built_from_account() {
        let sender = ApiSender::new(
            Client::new(),
            "https://mail.zoho.com/api/",
            "12345",
            AccessToken::new("t", chrono::Utc::now()),
            Duration::from_secs(5),
        );

        assert_eq!(sender.endpoint, "https://mail.zoho.com/api/accounts/12345/messages");
    }

    #[test]
    fn test_request_body_shape() {
        let request = SendMessageRequest {
            from_address: "news@example.com",
            to_address: "a@example.com",
            subject: "Hi",
            content: "<p>Hi</p>".to_string(),
            mail_format: "html",
        };

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["fromAddress"], "news@example.com");
        assert_eq!(json["toAddress"], "a@example.com");
        assert_eq!(json["mailFormat"], "html");
    }
}
