//! HTTP surface for manual campaign sends and mailbox scans.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

pub use handlers::{
    health, scan_mailbox, send_campaign, AppState, ErrorResponse, HealthResponse, SendRequest,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/campaigns/scan", post(scan_mailbox))
        .route("/campaigns/:campaign_id/send", post(send_campaign))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::bounce::{BounceText, MailboxScanner};
    use crate::dispatch::tests::{dispatcher, leak, seed, FakeProvider};
    use crate::error::ScanError;
    use crate::reconcile::Reconciler;
    use crate::store::MemoryStore;

    struct EmptyScanner;

    #[async_trait]
    impl MailboxScanner for EmptyScanner {
        async fn fetch_bounces(&self) -> Result<Vec<BounceText>, ScanError> {
            Ok(Vec::new())
        }
    }

    struct UnconfiguredScanner;

    #[async_trait]
    impl MailboxScanner for UnconfiguredScanner {
        async fn fetch_bounces(&self) -> Result<Vec<BounceText>, ScanError> {
            Err(ScanError::NotConfigured)
        }
    }

    fn app(store: Arc<MemoryStore>, scanner: Arc<dyn MailboxScanner>, provider: &'static FakeProvider) -> Router {
        let reconciler = Arc::new(Reconciler::new(store.clone(), scanner, chrono::Duration::hours(1)));
        router(AppState::new(dispatcher(store, provider), reconciler))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(EmptyScanner), leak(FakeProvider::default()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_send_campaign_ok() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "c1", &["a@example.com", "b@example.com"]).await;
        let app = app(store, Arc::new(EmptyScanner), leak(FakeProvider::default()));

        let response = app
            .oneshot(
                Request::post("/campaigns/c1/send")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"retry":true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["sent"], 2);
        assert_eq!(json["failed"], 0);
        assert_eq!(json["status"], "sent");
    }

    #[tokio::test]
    async fn test_send_campaign_without_body() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "c1", &["a@example.com"]).await;
        let app = app(store, Arc::new(EmptyScanner), leak(FakeProvider::default()));

        let response = app
            .oneshot(Request::post("/campaigns/c1/send").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_send_unknown_campaign_is_404() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(EmptyScanner), leak(FakeProvider::default()));

        let response = app
            .oneshot(Request::post("/campaigns/missing/send").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("missing"));
    }

    #[tokio::test]
    async fn test_send_without_recipients_is_400() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "c1", &[]).await;
        let app = app(store, Arc::new(EmptyScanner), leak(FakeProvider::default()));

        let response = app
            .oneshot(Request::post("/campaigns/c1/send").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_auth_failure_is_500_with_raw_text() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "c1", &["a@example.com"]).await;
        let provider = leak(FakeProvider {
            auth_error: Some(r#"{"error":"invalid_client"}"#.to_string()),
            ..Default::default()
        });
        let app = app(store, Arc::new(EmptyScanner), provider);

        let response = app
            .oneshot(Request::post("/campaigns/c1/send").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], r#"{"error":"invalid_client"}"#);
    }

    #[tokio::test]
    async fn test_scan_ok() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(EmptyScanner), leak(FakeProvider::default()));

        let response = app
            .oneshot(Request::post("/campaigns/scan").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["promoted_delivered"], 0);
        assert_eq!(json["processed_bounces"], 0);
        assert_eq!(json["bounces"], Value::Array(vec![]));
    }

    #[tokio::test]
    async fn test_scan_failure_is_500() {
        let app = app(
            Arc::new(MemoryStore::new()),
            Arc::new(UnconfiguredScanner),
            leak(FakeProvider::default()),
        );

        let response = app
            .oneshot(Request::post("/campaigns/scan").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
