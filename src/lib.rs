//! Review Relay - reviews Bitbucket pull requests with an AI model.
//!
//! Webhook deliveries are deduplicated by idempotency key, journaled, and
//! handed to a bounded worker pool that fetches the diff, requests an
//! analysis (with retry) and posts the result back as a pull request comment.

pub mod analysis;
pub mod bitbucket;
pub mod config;
pub mod effects;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;
pub mod worker;

#[cfg(test)]
pub mod test_utils;
