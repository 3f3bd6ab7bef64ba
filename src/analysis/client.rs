//! Retry-aware analysis client.
//!
//! [`AnalysisClient::analyze`] never fails: every outcome, including
//! exhausted retries and configuration problems, becomes an
//! [`AnalysisReport`] whose text can be posted to the pull request.

use std::fmt;
use std::future::Future;

use tracing::{error, info, warn};

use super::error::AnalysisError;
use super::prompt::build_review_prompt;
use super::retry::{RetryConfig, RetryResult, retry_with_backoff};

/// Text used when the service answered without any content.
pub const NO_ANALYSIS_TEXT: &str = "No analysis available";

/// A text-generation service that can review a prompt.
pub trait AnalysisBackend {
    /// Sends `prompt` and returns the generated text, or `None` if the service
    /// answered with no content.
    fn generate(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<Option<String>, AnalysisError>> + Send;
}

/// Outcome of an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisReport {
    /// The model's review.
    Analysis(String),

    /// The service succeeded but returned nothing.
    NoAnalysis,

    /// Every attempt failed with a transient error.
    RetriesExhausted { attempts: u32, last_error: String },

    /// A fatal error stopped the analysis.
    Failed { error: String },
}

impl AnalysisReport {
    /// Returns true for the error variants.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            AnalysisReport::RetriesExhausted { .. } | AnalysisReport::Failed { .. }
        )
    }

    /// Renders the report as comment text.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisReport::Analysis(text) => f.write_str(text),
            AnalysisReport::NoAnalysis => f.write_str(NO_ANALYSIS_TEXT),
            AnalysisReport::RetriesExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "Analysis failed after {} attempts due to network issues. Last error: {}",
                attempts, last_error
            ),
            AnalysisReport::Failed { error } => write!(
                f,
                "An error occurred while analyzing the code: {}",
                error
            ),
        }
    }
}

/// Builds the review prompt and calls the backend with retry.
#[derive(Debug, Clone)]
pub struct AnalysisClient<B> {
    backend: B,
    retry: RetryConfig,
}

impl<B: AnalysisBackend> AnalysisClient<B> {
    pub fn new(backend: B) -> Self {
        Self::with_retry(backend, RetryConfig::DEFAULT)
    }

    pub fn with_retry(backend: B, retry: RetryConfig) -> Self {
        Self { backend, retry }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reviews `diff`.
    pub async fn analyze(&self, diff: &str) -> AnalysisReport {
        let prompt = build_review_prompt(diff);
        let backend = &self.backend;
        let prompt = prompt.as_str();

        info!(diff_chars = diff.len(), "Starting analysis");
        let report = match retry_with_backoff(self.retry, move || backend.generate(prompt)).await {
            RetryResult::Success(Some(text)) if !text.trim().is_empty() => {
                AnalysisReport::Analysis(text)
            }
            RetryResult::Success(_) => {
                warn!("Analysis service returned no content");
                AnalysisReport::NoAnalysis
            }
            RetryResult::ExhaustedRetries {
                last_error,
                attempts,
            } => {
                error!(attempts, error = %last_error, "Analysis retries exhausted");
                AnalysisReport::RetriesExhausted {
                    attempts,
                    last_error: last_error.to_string(),
                }
            }
            RetryResult::Fatal(e) => {
                error!(error = %e, kind = ?e.kind, "Analysis failed");
                AnalysisReport::Failed {
                    error: e.to_string(),
                }
            }
        };

        info!(chars = report.text().len(), is_error = report.is_error(), "Analysis complete");
        report
    }
}
