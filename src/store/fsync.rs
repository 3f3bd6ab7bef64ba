//! Low-level fsync operations for durable snapshot writes.
//!
//! Both file and directory fsyncs are required: renaming a file updates the
//! directory entry, and without a directory fsync that entry may not survive
//! a power loss even though the file contents were synced.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that newly created or renamed entries are durable.
///
/// Only call this with directory paths.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn fsync_file_after_write() {
        let dir = tempdir().unwrap();
        let mut file = File::create(dir.path().join("markers.json")).unwrap();
        file.write_all(b"{}").unwrap();

        fsync_file(&file).unwrap();
    }

    #[test]
    fn fsync_dir_after_create() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("journal.json")).unwrap();

        fsync_dir(dir.path()).unwrap();
    }

    #[test]
    fn fsync_dir_fails_on_nonexistent() {
        let dir = tempdir().unwrap();
        assert!(fsync_dir(&dir.path().join("missing")).is_err());
    }
}
