//! Bitbucket API error type.
//!
//! Fetch and publish are never retried, so unlike analysis errors these carry
//! no transient/permanent classification. The status code is kept so that the
//! diagnostic comment and the journal can say what the host answered.

use std::fmt;
use thiserror::Error;

/// A failed call to the Bitbucket API.
#[derive(Debug, Error)]
pub struct HostApiError {
    /// The HTTP status code, if a response was received.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying transport error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for HostApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "Bitbucket API error (HTTP {}): {}", code, self.message),
            None => write!(f, "Bitbucket API error: {}", self.message),
        }
    }
}

impl HostApiError {
    /// An error for a non-2xx response.
    pub fn with_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
            source: None,
        }
    }

    /// An error raised before or without a response.
    pub fn without_status(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Credentials were not configured, so no request was made.
    pub fn missing_credentials() -> Self {
        Self::without_status("Bitbucket credentials not configured")
    }

    /// Wraps a reqwest error, keeping its status code when present.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        };

        Self {
            status_code: err.status().map(|s| s.as_u16()),
            message,
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status() {
        let err = HostApiError::with_status(404, "not found");
        assert_eq!(err.to_string(), "Bitbucket API error (HTTP 404): not found");
    }

    #[test]
    fn display_without_status() {
        let err = HostApiError::missing_credentials();
        assert_eq!(
            err.to_string(),
            "Bitbucket API error: Bitbucket credentials not configured"
        );
        assert!(err.status_code.is_none());
    }
}
