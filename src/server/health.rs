//! Liveness and readiness endpoints.
//!
//! `/health` only says the process is serving requests. `/ready` also reports
//! whether the credentials needed to fetch diffs, call the analysis service
//! and post comments were configured. Missing credentials never stop the
//! server from starting.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use super::AppState;

/// Liveness handler. Always `200 OK`.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<&'static str>,
}

/// Readiness handler.
///
/// ```text
/// GET /ready
///
/// 200 {"status":"healthy","message":"All required environment variables are set"}
/// 503 {"status":"error","message":"Missing environment variables: GEMINI_API_KEY","missing":["GEMINI_API_KEY"]}
/// ```
pub async fn ready_handler(State(app_state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let missing = app_state.missing_credentials().to_vec();
    if missing.is_empty() {
        return (
            StatusCode::OK,
            Json(Readiness {
                status: "healthy",
                message: "All required environment variables are set".to_string(),
                missing,
            }),
        );
    }

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(Readiness {
            status: "error",
            message: format!("Missing environment variables: {}", missing.join(", ")),
            missing,
        }),
    )
}
