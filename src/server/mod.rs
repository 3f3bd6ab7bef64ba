//! HTTP server for the review relay.
//!
//! # Endpoints
//!
//! - `POST /webhook` (and `/webhook/`) - Accepts Bitbucket pull request deliveries
//! - `GET /webhook` - Reports that the endpoint is active
//! - `GET /health` - Returns 200 if the server is running
//! - `GET /ready` - Returns 200 if all credentials are configured, 503 otherwise
//! - `GET /api/v1/events` - Recent journal records, newest first
//! - `GET /api/v1/events/{id}` - One journal record
//! - `GET /api/v1/reports` - Recent successful reviews

pub mod events;
pub mod health;
pub mod state;
pub mod webhook;

pub use events::{get_event_handler, list_events_handler, list_reports_handler};
pub use health::{health_handler, ready_handler};
pub use state::AppState;
pub use webhook::{WebhookError, webhook_handler, webhook_probe_handler};

use tower_http::trace::TraceLayer;

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route(
            "/webhook",
            get(webhook_probe_handler).post(webhook_handler),
        )
        .route(
            "/webhook/",
            get(webhook_probe_handler).post(webhook_handler),
        )
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/api/v1/events", get(list_events_handler))
        .route("/api/v1/events/{id}", get(get_event_handler))
        .route("/api/v1/reports", get(list_reports_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
