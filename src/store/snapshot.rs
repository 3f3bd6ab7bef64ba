//! Atomic JSON snapshots for the in-memory stores.
//!
//! Each store owns one snapshot file under the state directory. The in-memory
//! copy is authoritative; the snapshot is rewritten inside the store's critical
//! section after every mutation so that a restart sees a consistent view.
//!
//! # Atomic Writes
//!
//! 1. Write to `<file>.tmp`
//! 2. fsync the temp file
//! 3. Rename over `<file>`
//! 4. fsync the parent directory
//!
//! Readers therefore see either the old or the new snapshot, never a partial
//! write.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::fsync::{fsync_dir, fsync_file};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur while reading or writing snapshots.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Envelope written to disk around a store's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// When this snapshot was written.
    pub snapshot_at: DateTime<Utc>,

    /// The store contents.
    pub data: T,
}

impl<T> Snapshot<T> {
    /// Wraps store contents with the current schema version and timestamp.
    pub fn new(data: T) -> Self {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            data,
        }
    }
}

/// Saves `data` atomically to `path`.
pub fn save_snapshot_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(&Snapshot::new(data))?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Loads a snapshot from disk, checking the schema version.
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Snapshot<T>> {
    let bytes = std::fs::read(path)?;
    let snapshot: Snapshot<T> = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(StoreError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Attempts to load a snapshot, returning `None` if the file doesn't exist.
///
/// Other errors (malformed JSON, schema mismatch) are propagated.
pub fn try_load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<Snapshot<T>>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Like [`try_load_snapshot`], but a snapshot that cannot be decoded or has
/// another schema version is renamed to `<file>.corrupt-<timestamp>` and
/// treated as absent. IO errors other than a missing file are propagated.
pub fn load_snapshot_or_quarantine<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<Snapshot<T>>> {
    match try_load_snapshot(path) {
        Err(e @ (StoreError::Json(_) | StoreError::SchemaMismatch { .. })) => {
            let aside = quarantine_path(path);
            std::fs::rename(path, &aside)?;
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "Unreadable snapshot moved aside, starting empty"
            );
            Ok(None)
        }
        other => other,
    }
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
    path.with_file_name(name)
}
