//! Host effect types.

use url::Url;

/// An operation against the source-control host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostEffect {
    /// Download the diff of a pull request.
    FetchDiff { url: Url },

    /// Post a comment on a pull request. Never retried.
    PostComment { url: Url, body: String },
}

impl HostEffect {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            HostEffect::FetchDiff { .. } => "fetch_diff",
            HostEffect::PostComment { .. } => "post_comment",
        }
    }

    /// The target URL of the effect.
    pub fn url(&self) -> &Url {
        match self {
            HostEffect::FetchDiff { url } | HostEffect::PostComment { url, .. } => url,
        }
    }
}

/// Response to a [`HostEffect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostResponse {
    /// Raw diff text from `FetchDiff`.
    Diff(String),

    /// The comment was accepted.
    Posted,
}
