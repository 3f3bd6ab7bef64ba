//! Runtime configuration from command-line flags and environment variables.
//!
//! Credentials come from the environment so they stay out of process
//! listings. A missing credential never stops the process: it is reported by
//! `/ready` and the affected call fails with a configuration error.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::analysis::{
    DEFAULT_ANALYSIS_TIMEOUT, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiConfig,
    RetryConfig,
};
use crate::bitbucket::{BitbucketConfig, DEFAULT_HOST_TIMEOUT};
use crate::store::{
    DEFAULT_DEDUPE_CAPACITY, DEFAULT_JOURNAL_CAPACITY, DedupeStore, EventJournal, JOURNAL_FILE,
    MARKERS_FILE, StoreError,
};
use crate::worker::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};

pub const BITBUCKET_EMAIL_VAR: &str = "BITBUCKET_EMAIL";
pub const BITBUCKET_API_TOKEN_VAR: &str = "BITBUCKET_API_TOKEN";
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Settings shared by every subcommand.
#[derive(Args, Clone)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "REVIEW_RELAY_BIND", default_value = "0.0.0.0:5000", global = true)]
    pub bind: SocketAddr,

    /// Directory for the marker and journal snapshots. Memory-only if unset.
    #[arg(long, env = "REVIEW_RELAY_STATE_DIR", value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Number of concurrent review workers.
    #[arg(long, default_value_t = DEFAULT_WORKERS, global = true)]
    pub workers: usize,

    /// Jobs that may wait for a worker before deliveries are refused.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, global = true)]
    pub queue_capacity: usize,

    /// Accepted idempotency keys remembered for deduplication.
    #[arg(long, default_value_t = DEFAULT_DEDUPE_CAPACITY, global = true)]
    pub marker_capacity: usize,

    /// Journal records kept.
    #[arg(long, default_value_t = DEFAULT_JOURNAL_CAPACITY, global = true)]
    pub journal_capacity: usize,

    /// Seconds to let queued reviews finish on shutdown.
    #[arg(long, value_name = "SECS", default_value_t = 60, global = true)]
    pub shutdown_grace: u64,

    /// Attempts per analysis request, including the first.
    #[arg(long, default_value_t = RetryConfig::DEFAULT.max_attempts, global = true)]
    pub analysis_attempts: u32,

    /// Shared secret for `X-Hub-Signature` verification. Unsigned deliveries
    /// are accepted if unset.
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true, global = true)]
    pub webhook_secret: Option<String>,

    #[arg(long, env = BITBUCKET_EMAIL_VAR, hide_env_values = true, global = true)]
    pub bitbucket_email: Option<String>,

    #[arg(long, env = BITBUCKET_API_TOKEN_VAR, hide_env_values = true, global = true)]
    pub bitbucket_api_token: Option<String>,

    #[arg(long, env = GEMINI_API_KEY_VAR, hide_env_values = true, global = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GEMINI_MODEL, global = true)]
    pub gemini_model: String,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_BASE_URL, global = true)]
    pub gemini_base_url: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("state_dir", &self.state_dir)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("missing_credentials", &self.missing_credentials())
            .finish_non_exhaustive()
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

impl Config {
    /// Names of credential variables that are unset or empty.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        [
            (BITBUCKET_EMAIL_VAR, &self.bitbucket_email),
            (BITBUCKET_API_TOKEN_VAR, &self.bitbucket_api_token),
            (GEMINI_API_KEY_VAR, &self.gemini_api_key),
        ]
        .into_iter()
        .filter(|(_, value)| present(value).is_none())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn bitbucket(&self) -> BitbucketConfig {
        BitbucketConfig {
            email: present(&self.bitbucket_email),
            api_token: present(&self.bitbucket_api_token),
            timeout: DEFAULT_HOST_TIMEOUT,
        }
    }

    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.gemini_base_url.trim_end_matches('/').to_string(),
            model: self.gemini_model.clone(),
            api_key: present(&self.gemini_api_key),
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.analysis_attempts.max(1),
            ..RetryConfig::DEFAULT
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }

    pub fn webhook_secret(&self) -> Option<Vec<u8>> {
        present(&self.webhook_secret).map(String::into_bytes)
    }

    /// Opens both stores, loading snapshots from the state directory if one
    /// is configured.
    pub fn open_stores(&self) -> Result<(DedupeStore, EventJournal), StoreError> {
        match &self.state_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok((
                    DedupeStore::open(dir.join(MARKERS_FILE), self.marker_capacity)?,
                    EventJournal::open(dir.join(JOURNAL_FILE), self.journal_capacity)?,
                ))
            }
            None => Ok((
                DedupeStore::new(self.marker_capacity),
                EventJournal::new(self.journal_capacity),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    fn parse(args: &[&str]) -> Config {
        let argv = std::iter::once("review-relay").chain(args.iter().copied());
        TestCli::parse_from(argv).config
    }

    #[test]
    fn defaults_match_library_constants() {
        let config = parse(&[
            "--bitbucket-email",
            "me@example.com",
            "--bitbucket-api-token",
            "t",
            "--gemini-api-key",
            "k",
        ]);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.journal_capacity, DEFAULT_JOURNAL_CAPACITY);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(60));
        assert_eq!(config.retry(), RetryConfig::DEFAULT);
        assert_eq!(config.gemini().model, DEFAULT_GEMINI_MODEL);
        assert!(config.missing_credentials().is_empty());
    }

    #[test]
    fn empty_credentials_count_as_missing() {
        let config = parse(&["--bitbucket-email", "", "--gemini-api-key", "  ", "--bitbucket-api-token", "t"]);
        assert_eq!(
            config.missing_credentials(),
            vec![BITBUCKET_EMAIL_VAR, GEMINI_API_KEY_VAR]
        );
        assert_eq!(config.bitbucket().email, None);
        assert_eq!(config.gemini().api_key, None);
    }

    #[test]
    fn debug_does_not_print_secrets() {
        let config = parse(&["--gemini-api-key", "super-secret-key", "--webhook-secret", "hook-secret"]);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-key"));
        assert!(!rendered.contains("hook-secret"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = parse(&["--gemini-base-url", "http://localhost:8080/v1beta/"]);
        assert_eq!(config.gemini().base_url, "http://localhost:8080/v1beta");
    }

    #[test]
    fn memory_stores_without_state_dir() {
        let config = parse(&["--marker-capacity", "5", "--journal-capacity", "3"]);
        let (dedupe, journal) = config.open_stores().unwrap();
        assert_eq!(dedupe.capacity(), 5);
        assert!(dedupe.path().is_none());
        assert!(journal.path().is_none());
    }

    #[test]
    fn file_stores_with_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let config = parse(&["--state-dir", state_dir.to_str().unwrap()]);

        let (dedupe, journal) = config.open_stores().unwrap();
        assert_eq!(dedupe.path(), Some(state_dir.join(MARKERS_FILE).as_path()));
        assert_eq!(journal.path(), Some(state_dir.join(JOURNAL_FILE).as_path()));
    }
}
