//! Journal records describing the lifecycle of one accepted event.
//!
//! A record is created by the dispatcher in [`EventStatus::Processing`] (or
//! directly in [`EventStatus::Skipped`]) and moved to a terminal status exactly
//! once by the worker that owns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::PullRequestEvent;
use super::ids::{EventId, PrId};

/// Status of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Accepted; the pipeline has not finished yet.
    Processing,
    /// The analysis completed and a report was produced.
    Success,
    /// The diff could not be fetched or the links were unusable.
    Error,
    /// The pull request was not open; nothing was done.
    Skipped,
}

impl EventStatus {
    /// Returns true if no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Processing)
    }

    /// Returns the lowercase name used in logs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Processing => "processing",
            EventStatus::Success => "success",
            EventStatus::Error => "error",
            EventStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of posting the comment, kept separate from the record status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// No publish attempt has happened yet.
    Pending,
    /// The comment was accepted by the host.
    Delivered,
    /// The host rejected the comment or could not be reached.
    Failed { detail: String },
    /// Nothing was published (e.g. skipped events).
    NotAttempted,
}

/// One entry in the event journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub received_at: DateTime<Utc>,
    pub subject_title: String,
    pub subject_id: PrId,
    pub subject_state: String,
    pub repository: Option<String>,
    pub idempotency_key: String,
    pub updated_on: Option<DateTime<Utc>>,
    pub status: EventStatus,
    /// The analysis text (or error report standing in for it).
    pub result: Option<String>,
    /// Diagnostic attached to `error` records.
    pub error_detail: Option<String>,
    pub publish: PublishOutcome,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Creates a record for an event that was just accepted for processing.
    pub fn processing(event: &PullRequestEvent) -> Self {
        EventRecord {
            id: EventId::new_v4(),
            received_at: Utc::now(),
            subject_title: event.title.clone(),
            subject_id: event.pr,
            subject_state: event.state.clone(),
            repository: event.repository.clone(),
            idempotency_key: event.idempotency_key().as_str().to_string(),
            updated_on: event.updated_on,
            status: EventStatus::Processing,
            result: None,
            error_detail: None,
            publish: PublishOutcome::Pending,
            completed_at: None,
        }
    }

    /// Creates an already-terminal record for a pull request that is not open.
    pub fn skipped(event: &PullRequestEvent) -> Self {
        let mut record = Self::processing(event);
        record.status = EventStatus::Skipped;
        record.result = Some(format!(
            "Pull request is {}, skipping review.",
            event.state
        ));
        record.publish = PublishOutcome::NotAttempted;
        record.completed_at = Some(record.received_at);
        record
    }
}

/// The terminal state a worker writes back into its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub status: EventStatus,
    pub result: Option<String>,
    pub error_detail: Option<String>,
    pub publish: PublishOutcome,
}

impl Completion {
    /// Analysis finished; `report` is what was (or should have been) posted.
    pub fn success(report: String, publish: PublishOutcome) -> Self {
        Completion {
            status: EventStatus::Success,
            result: Some(report),
            error_detail: None,
            publish,
        }
    }

    /// The pipeline failed before analysis; `diagnostic` was posted instead.
    pub fn error(diagnostic: String, publish: PublishOutcome) -> Self {
        Completion {
            status: EventStatus::Error,
            result: None,
            error_detail: Some(diagnostic),
            publish,
        }
    }
}
