//! Inbound webhook handling for Bitbucket pull request events.
//!
//! - [`signature`]: optional HMAC-SHA256 verification of the raw body
//! - [`parser`]: decoding the body into a [`PullRequestEvent`](crate::types::PullRequestEvent)

pub mod parser;
pub mod signature;

pub use parser::{
    DEFAULT_TITLE, MalformedEvent, UNKNOWN_STATE, parse_pull_request_event,
    parse_pull_request_payload,
};
pub use signature::{
    SIGNATURE_HEADER, SignatureError, parse_signature_header, sign_payload, verify_signature,
};
