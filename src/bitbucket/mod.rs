//! Bitbucket Cloud integration: diff fetching and comment publishing.

pub mod client;
pub mod diff_url;
pub mod error;

pub use client::{BitbucketClient, BitbucketConfig, DEFAULT_HOST_TIMEOUT};
pub use diff_url::normalize_diff_url;
pub use error::HostApiError;
