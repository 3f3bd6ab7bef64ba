//! Durable in-process stores.
//!
//! - [`DedupeStore`]: which logical events have already been accepted
//! - [`EventJournal`]: the most recent events and their outcomes
//!
//! Both keep their authoritative copy in memory and, when opened against a
//! state directory, rewrite an atomic JSON snapshot after each mutation.

pub mod dedupe;
pub mod fsync;
pub mod journal;
pub mod snapshot;

pub use dedupe::{DEFAULT_DEDUPE_CAPACITY, DedupeStore, IdempotencyKey, PutOutcome};
pub use journal::{DEFAULT_JOURNAL_CAPACITY, EventJournal, INTERRUPTED_DETAIL, JournalError};
pub use snapshot::{SCHEMA_VERSION, Snapshot, StoreError};

/// File name of the dedupe marker snapshot inside the state directory.
pub const MARKERS_FILE: &str = "markers.json";

/// File name of the journal snapshot inside the state directory.
pub const JOURNAL_FILE: &str = "journal.json";
