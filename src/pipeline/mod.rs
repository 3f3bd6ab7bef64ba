//! The per-event review pipeline: Fetch → Analyze → Publish.
//!
//! A [`Pipeline`] run turns one open pull request event into a
//! [`Completion`]:
//!
//! ```text
//!  links ok? ──no──► publish diagnostic ──► error
//!     │
//!  fetch diff ──fail──► publish diagnostic ──► error
//!     │
//!  analyze (retried inside the client)
//!     │
//!  publish report ──► success (publish outcome attached)
//! ```
//!
//! The pipeline never returns an error itself. Host failures become
//! diagnostic comments, analysis failures become bannered reports, and a
//! failed publish is only recorded.

pub mod messages;

use tracing::{error, info, instrument, warn};
use url::Url;

use crate::analysis::{AnalysisBackend, AnalysisClient};
use crate::bitbucket::normalize_diff_url;
use crate::effects::{HostEffect, HostInterpreter, HostResponse};
use crate::types::{Completion, PublishOutcome, PullRequestEvent};

use messages::{analysis_error_comment, fetch_failure_comment, invalid_link_comment};

/// Runs the review steps for a single event.
#[derive(Debug)]
pub struct Pipeline<H, B> {
    host: H,
    analysis: AnalysisClient<B>,
}

impl<H, B> Pipeline<H, B>
where
    H: HostInterpreter,
    B: AnalysisBackend,
{
    pub fn new(host: H, analysis: AnalysisClient<B>) -> Self {
        Self { host, analysis }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn analysis(&self) -> &AnalysisClient<B> {
        &self.analysis
    }

    /// Reviews `event` and returns the terminal state for its record.
    #[instrument(skip_all, fields(pr = %event.pr, commit = %event.commit.short()))]
    pub async fn run(&self, event: &PullRequestEvent) -> Completion {
        let comments_url = match parse_link(&event.comments_url) {
            Some(url) => url,
            None => {
                error!(link = ?event.comments_url, "Comments link is not a valid URL");
                let detail = format!("invalid comments link: {:?}", event.comments_url);
                return Completion::error(
                    detail.clone(),
                    PublishOutcome::Failed { detail },
                );
            }
        };

        let normalized = normalize_diff_url(&event.diff_url);
        let Some(diff_url) = parse_link(&normalized) else {
            error!(link = ?event.diff_url, "Diff link is not a valid URL");
            let diagnostic = invalid_link_comment(&event.diff_url);
            let publish = self.publish(&comments_url, diagnostic.clone()).await;
            return Completion::error(diagnostic, publish);
        };

        info!(title = %event.title, url = %diff_url, "Fetching diff");
        let diff = match self.fetch(diff_url.clone()).await {
            Ok(diff) => diff,
            Err(cause) => {
                error!(url = %diff_url, error = %cause, "Failed to fetch diff");
                let diagnostic = fetch_failure_comment(diff_url.as_str(), &cause);
                let publish = self.publish(&comments_url, diagnostic.clone()).await;
                return Completion::error(diagnostic, publish);
            }
        };

        let report = self.analysis.analyze(&diff).await;
        let text = if report.is_error() {
            analysis_error_comment(&report.text())
        } else {
            report.text()
        };

        let publish = self.publish(&comments_url, text.clone()).await;
        Completion::success(text, publish)
    }

    async fn fetch(&self, url: Url) -> Result<String, String> {
        match self.host.interpret(HostEffect::FetchDiff { url }).await {
            Ok(HostResponse::Diff(diff)) => Ok(diff),
            Ok(other) => Err(format!("unexpected host response: {:?}", other)),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Posts a comment. Failures are logged and returned as the outcome;
    /// nothing is retried.
    async fn publish(&self, url: &Url, body: String) -> PublishOutcome {
        let effect = HostEffect::PostComment {
            url: url.clone(),
            body,
        };
        match self.host.interpret(effect).await {
            Ok(_) => PublishOutcome::Delivered,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to publish comment");
                PublishOutcome::Failed {
                    detail: e.to_string(),
                }
            }
        }
    }
}

/// Parses an http(s) link.
fn parse_link(raw: &str) -> Option<Url> {
    Url::parse(raw.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, AnalysisErrorKind, NO_ANALYSIS_TEXT};
    use crate::test_utils::{MockHost, ScriptedBackend, sample_event};
    use crate::types::EventStatus;

    fn pipeline(host: MockHost, backend: ScriptedBackend) -> Pipeline<MockHost, ScriptedBackend> {
        Pipeline::new(host, AnalysisClient::new(backend))
    }

    #[tokio::test]
    async fn success_publishes_analysis() {
        let p = pipeline(
            MockHost::with_diff("+ new line"),
            ScriptedBackend::new(vec![Ok(Some("Looks good.".to_string()))]),
        );

        let completion = p.run(&sample_event(1, "abc123")).await;

        assert_eq!(completion.status, EventStatus::Success);
        assert_eq!(completion.result.as_deref(), Some("Looks good."));
        assert_eq!(completion.publish, PublishOutcome::Delivered);
        assert_eq!(p.host().fetch_count(), 1);
        assert_eq!(p.host().comments(), vec!["Looks good.".to_string()]);
    }

    #[tokio::test]
    async fn fetch_failure_publishes_diagnostic_and_errors() {
        let backend = ScriptedBackend::new(vec![]);
        let p = pipeline(MockHost::failing_fetch(404), backend);

        let completion = p.run(&sample_event(1, "abc123")).await;

        assert_eq!(completion.status, EventStatus::Error);
        assert_eq!(completion.publish, PublishOutcome::Delivered);
        let comments = p.host().comments();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].contains("Unable to fetch code changes"));
        assert!(comments[0].contains("404"));
        assert_eq!(completion.error_detail.as_deref(), Some(comments[0].as_str()));
        assert_eq!(p.analysis().backend().calls(), 0);
    }

    #[tokio::test]
    async fn invalid_diff_link_publishes_diagnostic_without_fetch() {
        let p = pipeline(MockHost::with_diff("x"), ScriptedBackend::new(vec![]));
        let mut event = sample_event(1, "abc123");
        event.diff_url = "not a url".to_string();

        let completion = p.run(&event).await;

        assert_eq!(completion.status, EventStatus::Error);
        assert_eq!(p.host().fetch_count(), 0);
        assert_eq!(p.host().comments().len(), 1);
    }

    #[tokio::test]
    async fn invalid_comments_link_publishes_nothing() {
        let p = pipeline(MockHost::with_diff("x"), ScriptedBackend::new(vec![]));
        let mut event = sample_event(1, "abc123");
        event.comments_url = "ftp://example.com/comments".to_string();

        let completion = p.run(&event).await;

        assert_eq!(completion.status, EventStatus::Error);
        assert!(matches!(completion.publish, PublishOutcome::Failed { .. }));
        assert!(p.host().effects().is_empty());
    }

    #[tokio::test]
    async fn diff_link_with_line_break_is_normalized_before_fetch() {
        let p = pipeline(
            MockHost::with_diff("+x"),
            ScriptedBackend::new(vec![Ok(Some("ok".to_string()))]),
        );
        let mut event = sample_event(1, "abc123");
        event.diff_url =
            "https://api.bitbucket.org/2.0/repositories/t/r/diff/t/r:abc%0Dt/r:def".to_string();

        p.run(&event).await;

        match &p.host().effects()[0] {
            HostEffect::FetchDiff { url } => {
                assert_eq!(url.path(), "/2.0/repositories/t/r/diff/t/r%3Aabc..t/r%3Adef");
            }
            other => panic!("expected fetch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn analysis_failure_is_bannered_but_succeeds() {
        let p = pipeline(
            MockHost::with_diff("+x"),
            ScriptedBackend::new(vec![Err(AnalysisError::new(
                AnalysisErrorKind::Configuration,
                "GEMINI_API_KEY not set",
            ))]),
        );

        let completion = p.run(&sample_event(1, "abc123")).await;

        assert_eq!(completion.status, EventStatus::Success);
        let text = completion.result.unwrap();
        assert!(text.starts_with("⚠️ **Code Review Bot Error**"));
        assert!(text.contains("GEMINI_API_KEY not set"));
    }

    #[tokio::test]
    async fn empty_analysis_posts_sentinel() {
        let p = pipeline(MockHost::with_diff("+x"), ScriptedBackend::new(vec![Ok(None)]));

        let completion = p.run(&sample_event(1, "abc123")).await;

        assert_eq!(completion.result.as_deref(), Some(NO_ANALYSIS_TEXT));
    }

    #[tokio::test]
    async fn publish_failure_keeps_success_status() {
        let p = pipeline(
            MockHost::with_diff("+x").failing_publish(500),
            ScriptedBackend::new(vec![Ok(Some("review".to_string()))]),
        );

        let completion = p.run(&sample_event(1, "abc123")).await;

        assert_eq!(completion.status, EventStatus::Success);
        match completion.publish {
            PublishOutcome::Failed { detail } => assert!(detail.contains("500")),
            other => panic!("expected failed publish, got {:?}", other),
        }
        // Exactly one publish attempt.
        assert_eq!(p.host().comments().len(), 1);
    }
}
