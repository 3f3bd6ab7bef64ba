//! Code analysis through an external text-generation service.
//!
//! - [`AnalysisClient`]: prompt construction, retry and report rendering
//! - [`GeminiBackend`]: the production backend
//! - [`AnalysisError`]: typed error taxonomy driving the retry decision

pub mod client;
pub mod error;
pub mod gemini;
pub mod prompt;
pub mod retry;

pub use client::{AnalysisBackend, AnalysisClient, AnalysisReport, NO_ANALYSIS_TEXT};
pub use error::{AnalysisError, AnalysisErrorKind};
pub use gemini::{
    DEFAULT_ANALYSIS_TIMEOUT, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiBackend,
    GeminiConfig,
};
pub use prompt::build_review_prompt;
pub use retry::{RetryConfig, RetryResult, retry_with_backoff};
