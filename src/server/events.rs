//! Read-only journal inspection endpoints.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use super::AppState;
use crate::types::{EventId, EventRecord, EventStatus, PrId};

#[derive(Debug, Error)]
pub enum EventsError {
    #[error("invalid event id: {0}")]
    InvalidId(String),

    #[error("event not found: {0}")]
    NotFound(EventId),
}

impl IntoResponse for EventsError {
    fn into_response(self) -> Response {
        let status = match &self {
            EventsError::InvalidId(_) => StatusCode::BAD_REQUEST,
            EventsError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `GET /api/v1/events`: the journal, newest first.
pub async fn list_events_handler(State(app_state): State<AppState>) -> Json<Vec<EventRecord>> {
    Json(app_state.journal().recent())
}

/// `GET /api/v1/events/{id}`.
pub async fn get_event_handler(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventRecord>, EventsError> {
    let id: EventId = id.parse().map_err(|_| EventsError::InvalidId(id))?;
    app_state
        .journal()
        .get(id)
        .map(Json)
        .ok_or(EventsError::NotFound(id))
}

/// A completed review, as listed by `/api/v1/reports`.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub event_id: EventId,
    pub pr: PrId,
    pub title: String,
    pub repository: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub report: String,
}

/// `GET /api/v1/reports`: journal records that carry an analysis report.
pub async fn list_reports_handler(State(app_state): State<AppState>) -> Json<Vec<ReportSummary>> {
    let reports = app_state
        .journal()
        .recent()
        .into_iter()
        .filter(|r| r.status == EventStatus::Success)
        .filter_map(|r| {
            let report = r.result?;
            Some(ReportSummary {
                event_id: r.id,
                pr: r.subject_id,
                title: r.subject_title,
                repository: r.repository,
                completed_at: r.completed_at,
                report,
            })
        })
        .collect();
    Json(reports)
}
