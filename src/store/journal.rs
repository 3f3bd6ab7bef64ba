//! Bounded, newest-first journal of recent events.
//!
//! The journal keeps the last N accepted events so operators can see what the
//! relay did recently. It is not an audit log: once the capacity is reached the
//! oldest record is dropped, whatever its status.
//!
//! Records enter in `processing` (or directly `skipped`) and are moved to a
//! terminal status exactly once via [`EventJournal::complete`].

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use super::snapshot::{Result, load_snapshot_or_quarantine, save_snapshot_atomic};
use crate::types::{Completion, EventId, EventRecord, EventStatus, PublishOutcome};

/// Default number of records retained.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 10;

/// Diagnostic written into records that were still processing at startup.
pub const INTERRUPTED_DETAIL: &str = "interrupted by shutdown";

/// Errors from journal transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    /// The record was never appended or has been evicted.
    #[error("event {0} not found in journal")]
    NotFound(EventId),

    /// The record already reached a terminal status.
    #[error("event {id} is already {status}")]
    AlreadyTerminal { id: EventId, status: EventStatus },
}

/// The event journal.
#[derive(Debug)]
pub struct EventJournal {
    /// Newest record at the front.
    records: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl EventJournal {
    /// Creates an empty in-memory journal.
    pub fn new(capacity: usize) -> Self {
        EventJournal {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            path: None,
        }
    }

    /// Opens a journal backed by a snapshot file.
    ///
    /// Records that were still `processing` when the snapshot was written
    /// belonged to a worker that no longer exists; they are marked `error`
    /// so they never stay in flight forever.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let capacity = capacity.max(1);

        let mut records: VecDeque<EventRecord> = load_snapshot_or_quarantine(&path)?
            .map(|snapshot| snapshot.data)
            .unwrap_or_default();
        records.truncate(capacity);

        let mut interrupted = 0;
        for record in records.iter_mut() {
            if record.status == EventStatus::Processing {
                record.status = EventStatus::Error;
                record.error_detail = Some(INTERRUPTED_DETAIL.to_string());
                record.completed_at = Some(Utc::now());
                if record.publish == PublishOutcome::Pending {
                    record.publish = PublishOutcome::NotAttempted;
                }
                interrupted += 1;
            }
        }

        if interrupted > 0 {
            warn!(interrupted, "Marked in-flight journal records as interrupted");
        }
        debug!(path = %path.display(), records = records.len(), "Loaded event journal");

        let journal = EventJournal {
            records: Mutex::new(records),
            capacity,
            path: Some(path),
        };
        if interrupted > 0 {
            journal.persist(&journal.lock());
        }
        Ok(journal)
    }

    /// Inserts `record` at the front, evicting the oldest record if the
    /// journal is full. Returns the evicted record, if any.
    pub fn append_bounded(&self, record: EventRecord) -> Option<EventRecord> {
        let mut records = self.lock();
        records.push_front(record);

        let evicted = if records.len() > self.capacity {
            records.pop_back()
        } else {
            None
        };
        if let Some(old) = &evicted {
            debug!(event_id = %old.id, status = %old.status, "Evicted journal record");
        }

        self.persist(&records);
        evicted
    }

    /// Moves a `processing` record to its terminal status.
    pub fn complete(
        &self,
        id: EventId,
        completion: Completion,
    ) -> std::result::Result<EventRecord, JournalError> {
        let mut records = self.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(JournalError::NotFound(id))?;

        if record.status.is_terminal() {
            return Err(JournalError::AlreadyTerminal {
                id,
                status: record.status,
            });
        }

        record.status = completion.status;
        record.result = completion.result;
        record.error_detail = completion.error_detail;
        record.publish = completion.publish;
        record.completed_at = Some(Utc::now());
        let updated = record.clone();

        self.persist(&records);
        Ok(updated)
    }

    /// Returns a copy of the record with `id`.
    pub fn get(&self, id: EventId) -> Option<EventRecord> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Returns all retained records, newest first.
    pub fn recent(&self) -> Vec<EventRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the journal holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot file path, if the journal is durable.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<EventRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, records: &VecDeque<EventRecord>) {
        if let Some(path) = &self.path
            && let Err(e) = save_snapshot_atomic(path, records)
        {
            warn!(path = %path.display(), error = %e, "Failed to persist event journal");
        }
    }
}
