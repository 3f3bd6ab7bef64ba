//! Messages sent from the dispatcher to the worker pool.

use crate::types::{EventId, PullRequestEvent};

/// One accepted event waiting for the pipeline.
///
/// The journal record identified by `event_id` already exists in
/// `processing`; the worker that receives the job is its only writer.
#[derive(Debug, Clone)]
pub struct Job {
    pub event_id: EventId,
    pub event: PullRequestEvent,
}
