//! Analysis service error types.
//!
//! Errors are classified for the retry loop:
//!
//! - **Transient**: connection failures, timeouts and protocol-level breakage.
//!   These are retried with backoff.
//! - **Fatal**: everything else (HTTP error statuses, undecodable responses,
//!   missing configuration). These are returned after a single attempt.
//!
//! The typed [`AnalysisErrorKind`] is the source of truth. Only errors of kind
//! [`AnalysisErrorKind::Other`] fall back to scanning the message text, since
//! they carry no structured information about what went wrong.

use std::fmt;
use thiserror::Error;

/// Message fragments that mark an otherwise unclassified error as transient.
const TRANSIENT_TERMS: [&str; 5] = [
    "connection",
    "timeout",
    "network",
    "disconnected",
    "protocol",
];

/// What went wrong talking to the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    /// The connection could not be established or was reset.
    Connect,
    /// The request exceeded its timeout.
    Timeout,
    /// The exchange broke at the HTTP/transport level (truncated body, etc.).
    Protocol,
    /// The service answered with an error status.
    Api { status: u16 },
    /// The response body could not be decoded.
    Decode,
    /// The client is not configured (e.g. no API key).
    Configuration,
    /// Anything else.
    Other,
}

/// A failed analysis call.
#[derive(Debug, Error)]
pub struct AnalysisError {
    pub kind: AnalysisErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AnalysisErrorKind::Api { status } => write!(f, "HTTP {}: {}", status, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl AnalysisError {
    /// Creates an error of the given kind without a transport source.
    pub fn new(kind: AnalysisErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// The service returned a non-2xx status.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Api { status }, message)
    }

    /// The client is missing required configuration.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AnalysisErrorKind::Configuration, message)
    }

    /// Categorizes a reqwest error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            AnalysisErrorKind::Timeout
        } else if err.is_connect() {
            AnalysisErrorKind::Connect
        } else if let Some(status) = err.status() {
            AnalysisErrorKind::Api {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            AnalysisErrorKind::Decode
        } else if err.is_body() || err.is_request() {
            AnalysisErrorKind::Protocol
        } else {
            AnalysisErrorKind::Other
        };

        Self {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Returns true if the call should be retried.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            AnalysisErrorKind::Connect
            | AnalysisErrorKind::Timeout
            | AnalysisErrorKind::Protocol => true,
            AnalysisErrorKind::Other => is_transient_message(&self.message),
            AnalysisErrorKind::Api { .. }
            | AnalysisErrorKind::Decode
            | AnalysisErrorKind::Configuration => false,
        }
    }
}

/// Heuristic for errors without a structured kind.
fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_TERMS.iter().any(|term| lower.contains(term))
}
