//! File lock types: advisory exclusive locks with leases.

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

/// Advisory exclusive lock on one repository-relative path.
///
/// Advisory means cooperating processes check it before writing; nothing
/// stops a process (or a human with `rm`) from bypassing it. At most one
/// non-expired lock exists per path; a lock past `expires_at` is logically
/// dead and anyone may purge it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLock {
    /// Normalized repository-relative path. The lock key.
    pub path: String,
    pub owner_instance_id: String,
    pub acquired_at: Timestamp,
    /// Hard lease end: `acquired_at` + lease duration, extended by renew.
    pub expires_at: Timestamp,
    /// Why the lock was taken.
    pub intent: String,
    /// Hex SHA-256 of the file's bytes at acquisition, `None` when the
    /// file did not exist yet. Compared on `detect_conflict`.
    pub content_hash: Option<String>,
}

impl FileLock {
    /// Create a lock starting now with the given lease.
    pub fn new(
        path: String,
        owner_instance_id: &str,
        intent: &str,
        lease: SignedDuration,
        content_hash: Option<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            path,
            owner_instance_id: owner_instance_id.to_string(),
            acquired_at: now,
            expires_at: now + lease,
            intent: intent.to_string(),
            content_hash,
        }
    }

    pub fn is_expired(&self) -> bool {
        Timestamp::now() > self.expires_at
    }

    pub fn is_owned_by(&self, instance_id: &str) -> bool {
        self.owner_instance_id == instance_id
    }
}

/// Result of an acquisition attempt. Contention is an immediate answer,
/// not an error — retry policy belongs to the caller.
#[derive(Debug, Clone)]
pub enum Acquire {
    Acquired(FileLock),
    /// Another instance holds a live lock on the path.
    Held(FileLock),
}

/// Result of a renew attempt.
#[derive(Debug, Clone)]
pub enum Renew {
    Renewed(FileLock),
    /// The lock is gone, expired, or owned by someone else. The caller no
    /// longer holds the path and must re-acquire.
    Lost,
}

/// Pure read of a path's lock state, relative to the calling instance.
#[derive(Debug, Clone)]
pub enum LockState {
    Free,
    HeldByCaller(FileLock),
    HeldByOther(FileLock),
    /// A lock document exists but its lease has run out.
    Expired(FileLock),
}

/// Result of optimistic conflict detection against a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// File bytes match the fingerprint taken at acquisition.
    Clean,
    /// The file changed out-of-band since the lock was taken.
    Detected {
        at_acquire: Option<String>,
        current: Option<String>,
    },
    /// The caller holds no lock on the path, so there is no fingerprint
    /// to compare against.
    NoLock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lock_is_not_expired() {
        let lock = FileLock::new(
            "src/main.rs".into(),
            "i-a",
            "edit",
            SignedDuration::from_secs(300),
            None,
        );
        assert!(!lock.is_expired());
        assert!(lock.is_owned_by("i-a"));
        assert!(!lock.is_owned_by("i-b"));
    }

    #[test]
    fn backdated_lock_is_expired() {
        let mut lock = FileLock::new(
            "src/main.rs".into(),
            "i-a",
            "edit",
            SignedDuration::from_secs(300),
            None,
        );
        lock.expires_at = Timestamp::now() - SignedDuration::from_secs(1);
        assert!(lock.is_expired());
    }
}
