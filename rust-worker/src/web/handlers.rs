//! Campaign endpoint handlers.
//!
//! Handlers are thin: they call into the [`Dispatcher`] or [`Reconciler`]
//! and map the error taxonomy onto status codes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::reconcile::Reconciler;

/// Shared application state.
///
/// The reconciler is shared with the scan scheduler running in the same
/// process.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, reconciler: Arc<Reconciler>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            reconciler,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::InvalidCampaign(_) | DispatchError::NoRecipients(_) => {
            StatusCode::BAD_REQUEST
        }
        DispatchError::Busy(_) => StatusCode::CONFLICT,
        DispatchError::Auth(_) | DispatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// Send
// =============================================================================

/// Optional send body. Already-sent recipients are skipped on every run, so
/// `retry` only shows up in the logs.
#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub retry: bool,
}

/// `POST /campaigns/:campaign_id/send`
pub async fn send_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    body: Option<Json<SendRequest>>,
) -> Response {
    let retry = body.map(|Json(b)| b.retry).unwrap_or_default();
    info!(campaign_id = %campaign_id, retry = retry, "send_request_received");

    match state.dispatcher.dispatch(&campaign_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            let status = dispatch_status(&e);
            if status.is_server_error() {
                error!(campaign_id = %campaign_id, error = %e, "send_request_failed");
            } else {
                warn!(campaign_id = %campaign_id, error = %e, "send_request_rejected");
            }
            error_response(status, e)
        }
    }
}

// =============================================================================
// Scan
// =============================================================================

/// `POST /campaigns/scan`
pub async fn scan_mailbox(State(state): State<AppState>) -> Response {
    info!("scan_request_received");

    match state.reconciler.run().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!(error = %e, "scan_request_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
