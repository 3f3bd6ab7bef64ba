//! Effects-as-data for source-control host operations.
//!
//! The pipeline describes what it wants the host to do as [`HostEffect`]
//! values and hands them to a [`HostInterpreter`]. The production interpreter
//! is [`crate::bitbucket::BitbucketClient`]; tests substitute recording mocks
//! so the state machine can be exercised without a network.

pub mod host;
pub mod interpreter;

pub use host::{HostEffect, HostResponse};
pub use interpreter::HostInterpreter;
