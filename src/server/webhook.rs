//! Webhook endpoint handler.
//!
//! Verifies (when a secret is configured), parses and dispatches Bitbucket
//! pull request deliveries. The response is sent as soon as the event is
//! journaled; fetching, analysis and publishing happen in the worker pool.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::webhooks::{
    MalformedEvent, SIGNATURE_HEADER, SignatureError, parse_pull_request_payload,
    verify_signature,
};
use crate::worker::{Acknowledgment, DispatchError};

/// Errors that reject a delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("malformed event: {0}")]
    Malformed(#[from] MalformedEvent),

    #[error("{0}")]
    Unavailable(#[from] DispatchError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::Malformed(_) => StatusCode::BAD_REQUEST,
            WebhookError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 202 Accepted: new event, `{"status":"received","event_id":..,"skipped":..}`
/// - 200 OK: already seen, `{"status":"duplicate"}`
/// - 400 Bad Request: malformed payload
/// - 401 Unauthorized: bad or missing signature (only with a secret)
/// - 503 Service Unavailable: queue full or shutting down
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), WebhookError> {
    debug!(bytes = body.len(), "Received webhook");

    if let Some(secret) = app_state.webhook_secret() {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if let Err(e) = verify_signature(&body, header, secret) {
            warn!(error = %e, "Rejected webhook signature");
            return Err(e.into());
        }
    }

    let event = parse_pull_request_payload(&body).inspect_err(|e| {
        warn!(error = %e, "Malformed webhook payload");
    })?;

    let pr = event.pr;
    match app_state.dispatcher().submit(event)? {
        Acknowledgment::Accepted { event_id, skipped } => {
            info!(%event_id, %pr, skipped, "Webhook accepted");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "received",
                    "event_id": event_id,
                    "skipped": skipped,
                })),
            ))
        }
        Acknowledgment::Duplicate => {
            debug!(%pr, "Duplicate webhook delivery");
            Ok((StatusCode::OK, Json(json!({ "status": "duplicate" }))))
        }
    }
}

/// `GET /webhook`, for checking the endpoint from a browser.
pub async fn webhook_probe_handler() -> Json<Value> {
    Json(json!({
        "status": "webhook_endpoint_active",
        "message": "Webhook endpoint is ready to receive POST requests",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
