//! Comment texts posted when the pipeline cannot produce a normal review.

/// Comment posted when the diff link cannot be turned into a request URL.
pub fn invalid_link_comment(link: &str) -> String {
    format!(
        "⚠️ **Unable to fetch code changes**\n\n\
         The pull request diff link in the webhook payload is not a valid URL: `{}`\n\n\
         Please check the webhook configuration and try again.",
        link.escape_debug()
    )
}

/// Comment posted when the diff could not be downloaded.
pub fn fetch_failure_comment(diff_url: &str, error: &str) -> String {
    format!(
        "⚠️ **Unable to fetch code changes**\n\n\
         Failed to retrieve the pull request diff from: `{}`\n\n\
         Error: {}\n\n\
         This could be due to:\n\
         - API authentication issues\n\
         - Repository access permissions\n\
         - Temporary API unavailability\n\n\
         Please check the webhook bot configuration and try again.",
        diff_url, error
    )
}

/// Wraps an analysis error report so it is clearly not a review.
pub fn analysis_error_comment(report: &str) -> String {
    format!(
        "⚠️ **Code Review Bot Error**\n\n{}\n\nPlease check the bot logs and try again later.",
        report
    )
}
