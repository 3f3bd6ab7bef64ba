//! Core domain types for the review relay.
//!
//! This module contains the fundamental types shared by the dispatcher, the
//! pipeline and the HTTP surface.

pub mod event;
pub mod ids;
pub mod record;

pub use event::{OPEN_STATE, PullRequestEvent};
pub use ids::{CommitHash, EventId, InvalidCommitHash, PrId};
pub use record::{Completion, EventRecord, EventStatus, PublishOutcome};
