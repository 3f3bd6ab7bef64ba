//! Event dispatch: deduplicate, journal, enqueue, acknowledge.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────────┐     ┌─────────┐
//! │   axum      │ ──► │ dispatcher               │ ──► │  queue  │ ──► workers
//! │  (accepts)  │     │ dedupe → journal → send  │     │ (bounded│
//! └─────────────┘     └──────────────────────────┘     └─────────┘
//!       │
//!       │ returns 202 / 200 immediately
//!       ▼
//! ```
//!
//! [`Dispatcher::submit`] never waits on the network. For a new event it:
//!
//! 1. reserves a queue slot (a full queue is reported as overload, with
//!    nothing written, so the host redelivers later),
//! 2. marks the idempotency key with an atomic insert-if-absent (losing a
//!    race to a concurrent delivery releases the slot and reports a
//!    duplicate),
//! 3. appends a `processing` journal record,
//! 4. sends the job through the reserved slot.
//!
//! Events for pull requests that are not open are marked and journaled as
//! `skipped` without touching the queue.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, instrument, warn};

use crate::store::{DedupeStore, EventJournal, PutOutcome};
use crate::types::{EventId, EventRecord, PullRequestEvent};

use super::message::Job;

/// Errors that prevent an event from being accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The job queue is full.
    #[error("job queue is full")]
    Overloaded,

    /// The dispatcher has been closed for shutdown.
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Immediate answer to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Acknowledgment {
    /// The event is new. `skipped` is true if the pull request was not open
    /// and no processing will happen.
    Accepted { event_id: EventId, skipped: bool },

    /// The event was already accepted earlier; nothing was done.
    Duplicate,
}

impl Acknowledgment {
    /// The journal record ID, for accepted events.
    pub fn event_id(&self) -> Option<EventId> {
        match self {
            Acknowledgment::Accepted { event_id, .. } => Some(*event_id),
            Acknowledgment::Duplicate => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Acknowledgment::Duplicate)
    }
}

/// Accepts decoded events and hands them to the worker pool.
///
/// The dispatcher is the only writer of dedupe markers and the only creator
/// of journal records. It is `Sync` and meant to be shared behind an `Arc`.
#[derive(Debug)]
pub struct Dispatcher {
    dedupe: Arc<DedupeStore>,
    journal: Arc<EventJournal>,
    /// `None` once closed.
    tx: Mutex<Option<mpsc::Sender<Job>>>,
}

impl Dispatcher {
    pub fn new(
        dedupe: Arc<DedupeStore>,
        journal: Arc<EventJournal>,
        tx: mpsc::Sender<Job>,
    ) -> Self {
        Dispatcher {
            dedupe,
            journal,
            tx: Mutex::new(Some(tx)),
        }
    }

    pub fn dedupe(&self) -> &DedupeStore {
        &self.dedupe
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Submits a decoded event.
    #[instrument(skip_all, fields(pr = %event.pr, commit = %event.commit.short(), state = %event.state))]
    pub fn submit(&self, event: PullRequestEvent) -> Result<Acknowledgment> {
        let key = event.idempotency_key();

        if let Some(marked_at) = self.dedupe.get(&key) {
            debug!(key = %key, %marked_at, "Duplicate delivery");
            return Ok(Acknowledgment::Duplicate);
        }

        if !event.is_open() {
            return Ok(self.skip(event));
        }

        let tx = self.sender()?;
        let permit = match tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                warn!(capacity = tx.max_capacity(), "Job queue full, rejecting event");
                return Err(DispatchError::Overloaded);
            }
            Err(TrySendError::Closed(())) => return Err(DispatchError::ShuttingDown),
        };

        if let PutOutcome::AlreadyPresent(_) = self.dedupe.put_if_absent(&key) {
            debug!(key = %key, "Lost race to concurrent delivery");
            return Ok(Acknowledgment::Duplicate);
        }

        let record = EventRecord::processing(&event);
        let event_id = record.id;
        self.journal.append_bounded(record);
        permit.send(Job { event_id, event });

        info!(event_id = %event_id, key = %key, "Event accepted");
        Ok(Acknowledgment::Accepted {
            event_id,
            skipped: false,
        })
    }

    fn skip(&self, event: PullRequestEvent) -> Acknowledgment {
        if let PutOutcome::AlreadyPresent(_) = self.dedupe.put_if_absent(&event.idempotency_key()) {
            return Acknowledgment::Duplicate;
        }

        let record = EventRecord::skipped(&event);
        let event_id = record.id;
        self.journal.append_bounded(record);

        info!(event_id = %event_id, "Pull request not open, skipping review");
        Acknowledgment::Accepted {
            event_id,
            skipped: true,
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Job>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DispatchError::ShuttingDown)
    }

    /// Drops the queue sender. Later submissions fail with
    /// [`DispatchError::ShuttingDown`], and workers see the end of the queue
    /// once it is drained.
    pub fn close(&self) {
        let closed = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if closed {
            info!("Dispatcher closed");
        }
    }

    /// Returns true until [`Dispatcher::close`] is called.
    pub fn is_open(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
