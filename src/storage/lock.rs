//! Lock storage: one document per locked path.
//!
//! Documents are keyed by the SHA-256 of the normalized path, so any path
//! maps to a flat, filesystem-safe file name. The create-if-absent
//! primitive on these documents is what arbitrates racing acquirers —
//! there is no separate guard.

use std::{fs, io};

use crate::hash;
use crate::model::FileLock;

use super::{Result, Store, StorageError};

impl Store {
    /// Creates the lock document for `lock.path` only if none exists.
    /// Returns `false` when another instance's document won the race.
    pub fn create_lock(&self, lock: &FileLock) -> Result<bool> {
        self.create_doc(&self.lock_path(&hash::lock_key(&lock.path)), lock)
    }

    /// The current lock document for a normalized path, if any.
    pub fn load_lock(&self, path: &str) -> Result<Option<FileLock>> {
        self.read_doc(&self.lock_path(&hash::lock_key(path)))
    }

    /// Overwrites a lock document in place. Used by renew, where the
    /// caller has already confirmed ownership of a live lock.
    pub fn replace_lock(&self, lock: &FileLock) -> Result<()> {
        self.write_doc(&self.lock_path(&hash::lock_key(&lock.path)), lock)
    }

    /// Deletes a lock document. Gone-already is success, so release,
    /// expiry reclaim, and sweeps can race without conflict.
    pub fn remove_lock(&self, path: &str) -> Result<bool> {
        self.remove_doc(&self.lock_path(&hash::lock_key(path)))
    }

    /// Every lock document, live and expired alike.
    ///
    /// A document that won't parse is fatal here rather than skipped:
    /// mutual exclusion depends on every process seeing every lock.
    pub fn list_locks(&self) -> Result<Vec<FileLock>> {
        let dir = self.root().join("locks");
        let mut locks = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(locks),
            Err(e) => return Err(StorageError::Io(e)),
        };
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(lock) = self.read_doc(&path)? {
                locks.push(lock);
            }
        }
        locks.sort_by(|a: &FileLock, b: &FileLock| a.path.cmp(&b.path));
        Ok(locks)
    }
}
