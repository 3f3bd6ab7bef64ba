//! Idempotency keys and the deduplication store.
//!
//! Bitbucket retries webhook deliveries that time out or fail, and the same
//! logical state of a pull request can be delivered several times. This module
//! derives a key per logical event and records which keys have already been
//! accepted.
//!
//! # Key Format
//!
//! `pullrequest:<repository>:<pr-id>:<commit-hash>`
//!
//! The source commit hash is the distinguishing facet: a redelivery of the
//! same commit collapses onto the same key, a new push yields a new one.
//! Title or description edits only bump the update timestamp and therefore do
//! not trigger another review.
//!
//! # Bounded Size
//!
//! Markers are kept in insertion order and evicted oldest-first once the store
//! exceeds its capacity.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::snapshot::{Result, load_snapshot_or_quarantine, save_snapshot_atomic};
use crate::types::{CommitHash, PrId};

/// Default number of markers retained.
pub const DEFAULT_DEDUPE_CAPACITY: usize = 1000;

/// A deduplication key that identifies a logical webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Creates the key for a pull request event.
    ///
    /// The repository name is escaped so that a `:` inside it cannot make two
    /// different (repository, id) pairs collide.
    pub fn pull_request(repository: Option<&str>, pr: PrId, commit: &CommitHash) -> Self {
        let repo = repository
            .unwrap_or_default()
            .replace('\\', "\\\\")
            .replace(':', "\\:");
        IdempotencyKey(format!(
            "pullrequest:{}:{}:{}",
            repo,
            pr.0,
            commit.as_str()
        ))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for IdempotencyKey {
    fn from(s: String) -> Self {
        IdempotencyKey(s)
    }
}

/// Result of [`DedupeStore::put_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was new and has been marked.
    Inserted,
    /// The key was already marked at the given time; nothing changed.
    AlreadyPresent(DateTime<Utc>),
}

/// One persisted marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MarkerEntry {
    key: String,
    marked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Markers {
    by_key: HashMap<String, DateTime<Utc>>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<String>,
}

impl Markers {
    fn insert(&mut self, key: String, marked_at: DateTime<Utc>) {
        self.by_key.insert(key.clone(), marked_at);
        self.order.push_back(key);
    }

    fn evict_to(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.by_key.remove(&oldest);
                evicted += 1;
            }
        }
        evicted
    }

    fn entries(&self) -> Vec<MarkerEntry> {
        self.order
            .iter()
            .filter_map(|key| {
                self.by_key.get(key).map(|marked_at| MarkerEntry {
                    key: key.clone(),
                    marked_at: *marked_at,
                })
            })
            .collect()
    }
}

/// Durable key → processed-marker map.
///
/// All access goes through one mutex; [`DedupeStore::put_if_absent`] performs
/// the check and the mark inside a single critical section, so concurrent
/// duplicate deliveries can never both be inserted.
#[derive(Debug)]
pub struct DedupeStore {
    markers: Mutex<Markers>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl DedupeStore {
    /// Creates an empty in-memory store.
    pub fn new(capacity: usize) -> Self {
        DedupeStore {
            markers: Mutex::new(Markers::default()),
            capacity: capacity.max(1),
            path: None,
        }
    }

    /// Opens a store backed by a snapshot file, loading existing markers.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        let mut markers = Markers::default();

        if let Some(snapshot) = load_snapshot_or_quarantine::<Vec<MarkerEntry>>(&path)? {
            for entry in snapshot.data {
                if !markers.by_key.contains_key(&entry.key) {
                    markers.insert(entry.key, entry.marked_at);
                }
            }
        }

        let capacity = capacity.max(1);
        let evicted = markers.evict_to(capacity);
        debug!(
            path = %path.display(),
            markers = markers.order.len(),
            evicted,
            "Loaded dedupe markers"
        );

        Ok(DedupeStore {
            markers: Mutex::new(markers),
            capacity,
            path: Some(path),
        })
    }

    /// Returns when `key` was marked, if it is present.
    pub fn get(&self, key: &IdempotencyKey) -> Option<DateTime<Utc>> {
        self.lock().by_key.get(key.as_str()).copied()
    }

    /// Returns true if `key` has been marked.
    pub fn contains(&self, key: &IdempotencyKey) -> bool {
        self.lock().by_key.contains_key(key.as_str())
    }

    /// Marks `key` unless it is already present.
    ///
    /// Check and insert happen under the same lock. When a key is inserted the
    /// oldest markers beyond capacity are evicted and the snapshot is rewritten.
    pub fn put_if_absent(&self, key: &IdempotencyKey) -> PutOutcome {
        let mut markers = self.lock();

        if let Some(marked_at) = markers.by_key.get(key.as_str()) {
            return PutOutcome::AlreadyPresent(*marked_at);
        }

        markers.insert(key.as_str().to_string(), Utc::now());
        let evicted = markers.evict_to(self.capacity);
        if evicted > 0 {
            debug!(evicted, capacity = self.capacity, "Evicted oldest dedupe markers");
        }

        self.persist(&markers);
        PutOutcome::Inserted
    }

    /// Number of markers currently held.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Returns true if no markers are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of markers retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot file path, if the store is durable.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Markers> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes the snapshot. Failure is logged; the in-memory marker stays, so
    /// the worst case after a crash is one extra review of the same commit.
    fn persist(&self, markers: &Markers) {
        if let Some(path) = &self.path
            && let Err(e) = save_snapshot_atomic(path, &markers.entries())
        {
            warn!(path = %path.display(), error = %e, "Failed to persist dedupe markers");
        }
    }
}
