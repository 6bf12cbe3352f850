//! Crash-safe file store for the persisted summary.
//!
//! Writes promote through a backup: the previous good file is renamed
//! aside before the new bytes land, and the backup is deleted only after
//! the new file is synced. A crash at any point leaves either the new file
//! or the backup intact, so readers always find the last-known-good bytes.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::StoreError;

pub struct StatsStore {
    path: PathBuf,
    backup_path: PathBuf,
}

impl StatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_path = path.with_extension("bak");
        Self { path, backup_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last-known-good bytes. A surviving backup means the last
    /// write was interrupted, so the backup is the good copy.
    pub fn read(&self) -> Result<Option<Vec<u8>>, StoreError> {
        if self.backup_path.exists() {
            match fs::read(&self.backup_path) {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(err) => {
                    warn!(path = %self.backup_path.display(), %err, "backup stats unreadable");
                }
            }
        }
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&self.path)?))
    }

    /// Write new bytes with backup promotion.
    pub fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if self.path.exists() {
            if self.backup_path.exists() {
                fs::remove_file(&self.backup_path)?;
            }
            fs::rename(&self.path, &self.backup_path).map_err(StoreError::Backup)?;
        }
        let mut file = File::create(&self.path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        if self.backup_path.exists() {
            fs::remove_file(&self.backup_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_what_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("batterystats.bin"));
        assert!(store.read().unwrap().is_none());
        store.write(b"first").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"first");
        store.write(b"second").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"second");
        assert!(!dir.path().join("batterystats.bak").exists());
    }

    #[test]
    fn surviving_backup_wins_over_partial_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batterystats.bin");
        let store = StatsStore::new(&path);
        store.write(b"good").unwrap();
        // Simulate a crash between the backup rename and the sync of the
        // replacement: the main file holds garbage, the backup survives.
        fs::rename(&path, dir.path().join("batterystats.bak")).unwrap();
        fs::write(&path, b"torn").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"good");
    }

    #[test]
    fn write_creates_missing_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatsStore::new(dir.path().join("state/deep/batterystats.bin"));
        store.write(b"x").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"x");
    }
}
