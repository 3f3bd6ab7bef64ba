//! Decoded pull request webhook event.
//!
//! The parser in [`crate::webhooks`] turns raw Bitbucket JSON into this type.
//! Once constructed, every field the pipeline needs is present, so downstream
//! code never re-validates the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CommitHash, PrId};
use crate::store::IdempotencyKey;

/// The pull request state that makes an event eligible for review.
///
/// Matched case-sensitively, exactly as the host reports it.
pub const OPEN_STATE: &str = "OPEN";

/// A validated pull request lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    /// Repository full name (`workspace/repo`), when the payload carries one.
    pub repository: Option<String>,

    /// The pull request ID.
    pub pr: PrId,

    /// Pull request title, for display.
    pub title: String,

    /// Host-reported state (`OPEN`, `MERGED`, `DECLINED`, ...).
    pub state: String,

    /// Where the diff can be fetched. May contain stray control characters;
    /// see [`crate::bitbucket::normalize_diff_url`].
    pub diff_url: String,

    /// Where review comments are posted.
    pub comments_url: String,

    /// Head commit of the source branch. This is the distinguishing facet of
    /// the idempotency key.
    pub commit: CommitHash,

    /// Last-updated timestamp, recorded for display only.
    pub updated_on: Option<DateTime<Utc>>,
}

impl PullRequestEvent {
    /// Returns true if the pull request is open and should be reviewed.
    pub fn is_open(&self) -> bool {
        self.state == OPEN_STATE
    }

    /// Derives the deduplication key for this event.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::pull_request(self.repository.as_deref(), self.pr, &self.commit)
    }
}
