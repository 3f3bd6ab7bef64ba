//! Bitbucket pull request payload parser.
//!
//! Decodes a `pullrequest:*` webhook body into a [`PullRequestEvent`]. Unknown
//! fields are ignored. Everything the pipeline needs downstream must be
//! present here, otherwise the payload is rejected with [`MalformedEvent`]
//! before any marker, record or job is created.
//!
//! Consumed fields:
//! - `pullrequest.id`, `pullrequest.source.commit.hash` (required)
//! - `pullrequest.links.diff.href`, `pullrequest.links.comments.href` (required)
//! - `pullrequest.state` (defaults to `"unknown"`, which is skipped)
//! - `pullrequest.title` (defaults to `"Unknown PR"`)
//! - `pullrequest.updated_on` (optional, RFC 3339, dropped if unparseable)
//! - `repository.full_name` (optional)

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::types::{CommitHash, PrId, PullRequestEvent};

/// Title used when the payload has none.
pub const DEFAULT_TITLE: &str = "Unknown PR";

/// State used when the payload has none. Never matches the open state.
pub const UNKNOWN_STATE: &str = "unknown";

/// A payload that lacks what the pipeline needs.
#[derive(Debug, Error)]
pub enum MalformedEvent {
    /// The body is not a JSON object of the expected shape.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but unusable.
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    pullrequest: Option<RawPullRequest>,
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    id: Option<u64>,
    title: Option<String>,
    state: Option<String>,
    updated_on: Option<String>,
    source: Option<RawSource>,
    links: Option<RawLinks>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    commit: Option<RawCommit>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLinks {
    diff: Option<RawHref>,
    comments: Option<RawHref>,
}

#[derive(Debug, Deserialize)]
struct RawHref {
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: Option<String>,
}

/// Parses raw body bytes.
pub fn parse_pull_request_payload(body: &[u8]) -> Result<PullRequestEvent, MalformedEvent> {
    let value: Value = serde_json::from_slice(body)?;
    parse_pull_request_event(&value)
}

/// Decodes an already-parsed JSON body.
///
/// # Examples
///
/// ```
/// use review_relay::webhooks::parse_pull_request_event;
///
/// let payload = serde_json::json!({
///     "pullrequest": {
///         "id": 42,
///         "state": "OPEN",
///         "source": { "commit": { "hash": "abc123def456" } },
///         "links": {
///             "diff": { "href": "https://api.bitbucket.org/2.0/repositories/a/b/pullrequests/42/diff" },
///             "comments": { "href": "https://api.bitbucket.org/2.0/repositories/a/b/pullrequests/42/comments" }
///         }
///     }
/// });
///
/// let event = parse_pull_request_event(&payload).unwrap();
/// assert_eq!(event.pr.0, 42);
/// assert_eq!(event.title, "Unknown PR");
/// ```
pub fn parse_pull_request_event(payload: &Value) -> Result<PullRequestEvent, MalformedEvent> {
    let raw = RawPayload::deserialize(payload)?;
    let pr = raw
        .pullrequest
        .ok_or(MalformedEvent::MissingField("pullrequest"))?;

    let id = pr.id.ok_or(MalformedEvent::MissingField("pullrequest.id"))?;

    let hash = pr
        .source
        .and_then(|s| s.commit)
        .and_then(|c| c.hash)
        .ok_or(MalformedEvent::MissingField("pullrequest.source.commit.hash"))?;
    let commit = CommitHash::parse(&hash).map_err(|_| MalformedEvent::InvalidField {
        field: "pullrequest.source.commit.hash",
        value: hash,
    })?;

    let (diff, comments) = match pr.links {
        Some(links) => (links.diff, links.comments),
        None => (None, None),
    };
    let diff_url = non_empty_href(diff).ok_or(MalformedEvent::MissingField(
        "pullrequest.links.diff.href",
    ))?;
    let comments_url = non_empty_href(comments).ok_or(MalformedEvent::MissingField(
        "pullrequest.links.comments.href",
    ))?;

    let updated_on = pr.updated_on.as_deref().and_then(parse_timestamp);

    Ok(PullRequestEvent {
        repository: raw
            .repository
            .and_then(|r| r.full_name)
            .filter(|name| !name.is_empty()),
        pr: PrId(id),
        title: pr.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        state: pr.state.unwrap_or_else(|| UNKNOWN_STATE.to_string()),
        diff_url,
        comments_url,
        commit,
        updated_on,
    })
}

fn non_empty_href(link: Option<RawHref>) -> Option<String> {
    link.and_then(|l| l.href).filter(|href| !href.trim().is_empty())
}

/// `updated_on` is display-only, so an unparseable value is dropped.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = raw, error = %e, "Ignoring unparseable pullrequest.updated_on");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_REPOSITORY, sample_event, sample_payload};
    use serde_json::json;

    fn without(mut payload: Value, pointer: &str) -> Value {
        let (parent, leaf) = pointer.rsplit_once('/').unwrap();
        payload
            .pointer_mut(parent)
            .and_then(Value::as_object_mut)
            .unwrap()
            .remove(leaf);
        payload
    }

    #[test]
    fn parses_full_payload() {
        let event = parse_pull_request_event(&sample_payload(42, "abc123def456", "OPEN")).unwrap();
        assert_eq!(event, sample_event(42, "abc123def456"));
        assert_eq!(event.repository.as_deref(), Some(TEST_REPOSITORY));
    }

    #[test]
    fn parses_raw_bytes() {
        let body = serde_json::to_vec(&sample_payload(1, "abc123", "MERGED")).unwrap();
        let event = parse_pull_request_payload(&body).unwrap();
        assert_eq!(event.state, "MERGED");
        assert!(!event.is_open());
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        for (pointer, field) in [
            ("/pullrequest/id", "pullrequest.id"),
            ("/pullrequest/source/commit/hash", "pullrequest.source.commit.hash"),
            ("/pullrequest/links/diff", "pullrequest.links.diff.href"),
            ("/pullrequest/links/comments", "pullrequest.links.comments.href"),
        ] {
            let payload = without(sample_payload(1, "abc123", "OPEN"), pointer);
            match parse_pull_request_event(&payload) {
                Err(MalformedEvent::MissingField(f)) => assert_eq!(f, field),
                other => panic!("expected missing {}, got {:?}", field, other),
            }
        }
    }

    #[test]
    fn empty_link_is_malformed() {
        let mut payload = sample_payload(1, "abc123", "OPEN");
        payload["pullrequest"]["links"]["diff"]["href"] = json!("  ");
        assert!(matches!(
            parse_pull_request_event(&payload),
            Err(MalformedEvent::MissingField("pullrequest.links.diff.href"))
        ));
    }

    #[test]
    fn missing_pullrequest_object_is_malformed() {
        let payload = json!({ "repository": { "full_name": "a/b" } });
        assert!(matches!(
            parse_pull_request_event(&payload),
            Err(MalformedEvent::MissingField("pullrequest"))
        ));
    }

    #[test]
    fn non_object_body_is_malformed() {
        assert!(matches!(
            parse_pull_request_payload(b"not json"),
            Err(MalformedEvent::Json(_))
        ));
        assert!(matches!(
            parse_pull_request_event(&json!([1, 2, 3])),
            Err(MalformedEvent::Json(_))
        ));
    }

    #[test]
    fn wrong_id_type_is_malformed() {
        let mut payload = sample_payload(1, "abc123", "OPEN");
        payload["pullrequest"]["id"] = json!("forty-two");
        assert!(matches!(
            parse_pull_request_event(&payload),
            Err(MalformedEvent::Json(_))
        ));
    }

    #[test]
    fn invalid_hash_is_malformed() {
        let payload = sample_payload(1, "not-a-hash!", "OPEN");
        assert!(matches!(
            parse_pull_request_event(&payload),
            Err(MalformedEvent::InvalidField { field: "pullrequest.source.commit.hash", .. })
        ));
    }

    #[test]
    fn optional_fields_take_defaults() {
        let mut payload = sample_payload(5, "abc123", "OPEN");
        for pointer in ["/pullrequest/title", "/pullrequest/state", "/pullrequest/updated_on"] {
            payload = without(payload, pointer);
        }
        payload.as_object_mut().unwrap().remove("repository");

        let event = parse_pull_request_event(&payload).unwrap();
        assert_eq!(event.title, DEFAULT_TITLE);
        assert_eq!(event.state, UNKNOWN_STATE);
        assert!(!event.is_open());
        assert_eq!(event.updated_on, None);
        assert_eq!(event.repository, None);
    }

    #[test]
    fn unparseable_timestamp_is_dropped() {
        let mut payload = sample_payload(1, "abc123", "OPEN");
        payload["pullrequest"]["updated_on"] = json!("2025-07-22 14:30:00");

        let event = parse_pull_request_event(&payload).unwrap();
        assert_eq!(event.updated_on, None);
        assert_eq!(event.idempotency_key(), sample_event(1, "abc123").idempotency_key());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut payload = sample_payload(1, "abc123", "OPEN");
        payload["actor"] = json!({ "display_name": "someone" });
        payload["pullrequest"]["reviewers"] = json!([]);
        assert!(parse_pull_request_event(&payload).is_ok());
    }
}
