//! Bitbucket REST client.
//!
//! Executes [`HostEffect`]s with HTTP basic auth. Each request carries the
//! client-wide timeout. Nothing here retries: a failed fetch is reported to the
//! pull request as a diagnostic, and a failed publish is recorded on the
//! journal entry.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::error::HostApiError;
use crate::effects::{HostEffect, HostInterpreter, HostResponse};

/// Default timeout for every Bitbucket request.
pub const DEFAULT_HOST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body excerpt kept in an error message.
const ERROR_BODY_LIMIT: usize = 500;

/// Connection settings for [`BitbucketClient`].
#[derive(Clone)]
pub struct BitbucketConfig {
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl BitbucketConfig {
    /// Creates a config with the default timeout.
    pub fn new(email: Option<String>, api_token: Option<String>) -> Self {
        Self {
            email,
            api_token,
            timeout: DEFAULT_HOST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for BitbucketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitbucketConfig")
            .field("email", &self.email)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone)]
struct Credentials {
    email: String,
    api_token: String,
}

/// A Bitbucket API client authenticating with an account email and API token.
#[derive(Clone)]
pub struct BitbucketClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
}

impl BitbucketClient {
    /// Builds a client. Missing credentials are allowed; every request then
    /// fails with [`HostApiError::missing_credentials`].
    pub fn new(config: BitbucketConfig) -> Result<Self, HostApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(HostApiError::from_reqwest)?;

        let credentials = match (config.email, config.api_token) {
            (Some(email), Some(api_token)) if !email.is_empty() && !api_token.is_empty() => {
                Some(Credentials { email, api_token })
            }
            _ => None,
        };

        Ok(Self { http, credentials })
    }

    /// Returns true if both credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn credentials(&self) -> Result<&Credentials, HostApiError> {
        self.credentials.as_ref().ok_or_else(|| {
            warn!("Bitbucket credentials not configured");
            HostApiError::missing_credentials()
        })
    }

    /// Downloads the diff at `url`. An empty body is an error.
    pub async fn fetch_diff(&self, url: &Url) -> Result<String, HostApiError> {
        let creds = self.credentials()?;
        debug!(url = %url, "Fetching diff");

        let response = self
            .http
            .get(url.clone())
            .basic_auth(&creds.email, Some(&creds.api_token))
            .send()
            .await
            .map_err(HostApiError::from_reqwest)?;

        let response = check_status(response).await?;
        let diff = response.text().await.map_err(HostApiError::from_reqwest)?;

        if diff.trim().is_empty() {
            return Err(HostApiError::without_status("empty diff"));
        }

        info!(url = %url, chars = diff.len(), "Fetched diff");
        Ok(diff)
    }

    /// Posts `body` as a pull request comment.
    pub async fn post_comment(&self, url: &Url, body: &str) -> Result<(), HostApiError> {
        let creds = self.credentials()?;

        let response = self
            .http
            .post(url.clone())
            .basic_auth(&creds.email, Some(&creds.api_token))
            .json(&json!({ "content": { "raw": body } }))
            .send()
            .await
            .map_err(HostApiError::from_reqwest)?;

        check_status(response).await?;
        info!(url = %url, chars = body.len(), "Posted comment");
        Ok(())
    }
}

impl std::fmt::Debug for BitbucketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitbucketClient")
            .field("has_credentials", &self.has_credentials())
            .finish_non_exhaustive()
    }
}

/// Turns a non-2xx response into an error carrying its status and body excerpt.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HostApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    let reason = status.canonical_reason().unwrap_or("unexpected status");
    let message = if excerpt.trim().is_empty() {
        reason.to_string()
    } else {
        format!("{}: {}", reason, excerpt.trim())
    };

    Err(HostApiError::with_status(status.as_u16(), message))
}

impl HostInterpreter for BitbucketClient {
    type Error = HostApiError;

    async fn interpret(&self, effect: HostEffect) -> Result<HostResponse, Self::Error> {
        debug!(effect = effect.name(), url = %effect.url(), "Interpreting host effect");
        match effect {
            HostEffect::FetchDiff { url } => self.fetch_diff(&url).await.map(HostResponse::Diff),
            HostEffect::PostComment { url, body } => self
                .post_comment(&url, &body)
                .await
                .map(|()| HostResponse::Posted),
        }
    }
}
