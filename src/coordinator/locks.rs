//! Lock operations: acquire, release, renew, check, conflict detection.

use crate::hash;
use crate::model::{Acquire, Conflict, FileLock, LockState, Renew};
use crate::storage::{Result, StorageError, normalize_path};

use super::Coordinator;

impl Coordinator {
    /// Attempts to take the advisory lock on a path.
    ///
    /// An expired lock found in the way is purged first (lazy expiry — no
    /// timer ever runs). Contention returns immediately as [`Acquire::Held`];
    /// the caller decides whether to retry, wait, or abort.
    pub fn acquire(&self, caller: &str, raw_path: &str, intent: &str) -> Result<Acquire> {
        let path = normalize_path(raw_path)?;
        self.maybe_sweep()?;

        for _ in 0..3 {
            match self.store.load_lock(&path)? {
                Some(existing) if !existing.is_expired() => return Ok(Acquire::Held(existing)),
                Some(_) => {
                    // Dead lease. Purge it and race for the slot; losing
                    // the race just means someone else purged it first.
                    self.store.remove_lock(&path)?;
                }
                None => {}
            }

            let lock = FileLock::new(
                path.clone(),
                caller,
                intent,
                self.lease,
                self.fingerprint(&path)?,
            );
            if self.store.create_lock(&lock)? {
                return Ok(Acquire::Acquired(lock));
            }
            // Lost the create race; loop to report the winner.
        }

        match self.store.load_lock(&path)? {
            Some(current) => Ok(Acquire::Held(current)),
            None => Err(StorageError::Contended(path)),
        }
    }

    /// Releases the caller's lock on a path.
    ///
    /// Releasing a lock you don't own, or one that doesn't exist, is a
    /// silent no-op — double release and races with expiry reclaim are
    /// benign.
    pub fn release(&self, caller: &str, raw_path: &str) -> Result<()> {
        let path = normalize_path(raw_path)?;
        match self.store.load_lock(&path)? {
            Some(lock) if lock.is_owned_by(caller) => {
                self.store.remove_lock(&path)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Extends the caller's lease from now and refreshes the content
    /// fingerprint. [`Renew::Lost`] when the lock is gone, expired, or
    /// owned by someone else — an expired lock is dead even to its owner,
    /// since a competitor may already be purging it.
    pub fn renew(&self, caller: &str, raw_path: &str) -> Result<Renew> {
        let path = normalize_path(raw_path)?;
        match self.store.load_lock(&path)? {
            Some(mut lock) if lock.is_owned_by(caller) && !lock.is_expired() => {
                lock.expires_at = jiff::Timestamp::now() + self.lease;
                lock.content_hash = self.fingerprint(&path)?;
                self.store.replace_lock(&lock)?;
                Ok(Renew::Renewed(lock))
            }
            _ => Ok(Renew::Lost),
        }
    }

    /// Pure read of a path's lock state. Mutates nothing, not even an
    /// expired document.
    pub fn check(&self, caller: &str, raw_path: &str) -> Result<LockState> {
        let path = normalize_path(raw_path)?;
        Ok(match self.store.load_lock(&path)? {
            None => LockState::Free,
            Some(lock) if lock.is_expired() => LockState::Expired(lock),
            Some(lock) if lock.is_owned_by(caller) => LockState::HeldByCaller(lock),
            Some(lock) => LockState::HeldByOther(lock),
        })
    }

    /// Compares the file's current bytes against the fingerprint stored
    /// when the caller acquired the lock.
    ///
    /// Advisory only: a conflict never blocks anything, it tells the
    /// caller to re-read, merge, or abort before overwriting.
    pub fn detect_conflict(&self, caller: &str, raw_path: &str) -> Result<Conflict> {
        let path = normalize_path(raw_path)?;
        match self.store.load_lock(&path)? {
            Some(lock) if lock.is_owned_by(caller) => {
                let current = self.fingerprint(&path)?;
                if current == lock.content_hash {
                    Ok(Conflict::Clean)
                } else {
                    Ok(Conflict::Detected {
                        at_acquire: lock.content_hash,
                        current,
                    })
                }
            }
            _ => Ok(Conflict::NoLock),
        }
    }

    /// Deletes every expired lock document. Housekeeping only — lazy
    /// expiry in `acquire` keeps correctness without this ever running.
    pub fn purge_expired(&self) -> Result<Vec<FileLock>> {
        let mut purged = Vec::new();
        for lock in self.store.list_locks()? {
            if lock.is_expired() && self.store.remove_lock(&lock.path)? {
                purged.push(lock);
            }
        }
        Ok(purged)
    }

    /// All lock documents, live and expired.
    pub fn list_locks(&self) -> Result<Vec<FileLock>> {
        self.store.list_locks()
    }

    fn fingerprint(&self, path: &str) -> Result<Option<String>> {
        Ok(hash::content_hash(&self.work_root.join(path))?)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use jiff::{SignedDuration, Timestamp};

    use super::super::tests::test_coordinator;
    use super::*;

    /// Rewrites a lock document with an `expires_at` in the past, as if
    /// the lease had run out while the owner was away.
    fn expire_lock(coordinator: &Coordinator, path: &str) {
        let mut lock = coordinator.store.load_lock(path).unwrap().unwrap();
        lock.expires_at = Timestamp::now() - SignedDuration::from_secs(1);
        coordinator.store.replace_lock(&lock).unwrap();
    }

    #[test]
    fn acquire_then_competitor_is_held() {
        let (_dir, coordinator) = test_coordinator();

        let Acquire::Acquired(lock) = coordinator.acquire("i-a", "src/f.py", "edit").unwrap()
        else {
            panic!("expected Acquired");
        };
        assert_eq!(lock.owner_instance_id, "i-a");

        let Acquire::Held(held) = coordinator.acquire("i-b", "src/f.py", "also edit").unwrap()
        else {
            panic!("expected Held");
        };
        assert_eq!(held.owner_instance_id, "i-a");
    }

    #[test]
    fn acquire_normalizes_the_path() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.acquire("i-a", "./src//f.py", "edit").unwrap();

        let Acquire::Held(_) = coordinator.acquire("i-b", "src/f.py", "edit").unwrap() else {
            panic!("normalized and raw spellings must collide");
        };
    }

    #[test]
    fn acquire_rejects_escaping_paths() {
        let (_dir, coordinator) = test_coordinator();
        let err = coordinator.acquire("i-a", "../outside.txt", "edit").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[test]
    fn expired_lock_is_reclaimed_by_next_acquirer() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.acquire("i-a", "src/f.py", "edit").unwrap();
        expire_lock(&coordinator, "src/f.py");

        let Acquire::Acquired(lock) = coordinator.acquire("i-b", "src/f.py", "take over").unwrap()
        else {
            panic!("expired lock must be reclaimable");
        };
        assert_eq!(lock.owner_instance_id, "i-b");
    }

    #[test]
    fn release_by_owner_frees_the_path() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.acquire("i-a", "src/f.py", "edit").unwrap();

        coordinator.release("i-a", "src/f.py").unwrap();

        assert!(matches!(coordinator.check("i-a", "src/f.py").unwrap(), LockState::Free));
    }

    #[test]
    fn release_by_non_owner_is_a_noop() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.acquire("i-a", "src/f.py", "edit").unwrap();

        coordinator.release("i-b", "src/f.py").unwrap();

        // A's lock is untouched.
        let lock = coordinator.store.load_lock("src/f.py").unwrap().unwrap();
        assert_eq!(lock.owner_instance_id, "i-a");
    }

    #[test]
    fn double_release_matches_single_release() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.acquire("i-a", "src/f.py", "edit").unwrap();

        coordinator.release("i-a", "src/f.py").unwrap();
        coordinator.release("i-a", "src/f.py").unwrap();

        assert!(matches!(coordinator.check("i-a", "src/f.py").unwrap(), LockState::Free));
    }

    #[test]
    fn renew_by_owner_strictly_extends_the_lease() {
        let (_dir, coordinator) = test_coordinator();
        let Acquire::Acquired(before) = coordinator.acquire("i-a", "src/f.py", "edit").unwrap()
        else {
            panic!("expected Acquired");
        };

        let Renew::Renewed(after) = coordinator.renew("i-a", "src/f.py").unwrap() else {
            panic!("owner renew of a live lock must succeed");
        };
        assert!(after.expires_at > before.expires_at);
    }

    #[test]
    fn renew_by_non_owner_changes_nothing() {
        let (_dir, coordinator) = test_coordinator();
        let Acquire::Acquired(before) = coordinator.acquire("i-a", "src/f.py", "edit").unwrap()
        else {
            panic!("expected Acquired");
        };

        assert!(matches!(coordinator.renew("i-b", "src/f.py").unwrap(), Renew::Lost));

        let current = coordinator.store.load_lock("src/f.py").unwrap().unwrap();
        assert_eq!(current.expires_at, before.expires_at);
        assert_eq!(current.owner_instance_id, "i-a");
    }

    #[test]
    fn renew_of_expired_or_missing_lock_is_lost() {
        let (_dir, coordinator) = test_coordinator();
        assert!(matches!(coordinator.renew("i-a", "src/f.py").unwrap(), Renew::Lost));

        coordinator.acquire("i-a", "src/f.py", "edit").unwrap();
        expire_lock(&coordinator, "src/f.py");
        assert!(matches!(coordinator.renew("i-a", "src/f.py").unwrap(), Renew::Lost));
    }

    #[test]
    fn check_reports_each_state() {
        let (_dir, coordinator) = test_coordinator();
        assert!(matches!(coordinator.check("i-a", "src/f.py").unwrap(), LockState::Free));

        coordinator.acquire("i-a", "src/f.py", "edit").unwrap();
        assert!(matches!(
            coordinator.check("i-a", "src/f.py").unwrap(),
            LockState::HeldByCaller(_)
        ));
        assert!(matches!(
            coordinator.check("i-b", "src/f.py").unwrap(),
            LockState::HeldByOther(_)
        ));

        expire_lock(&coordinator, "src/f.py");
        assert!(matches!(
            coordinator.check("i-b", "src/f.py").unwrap(),
            LockState::Expired(_)
        ));
    }

    #[test]
    fn conflict_detected_after_external_write() {
        let (dir, coordinator) = test_coordinator();
        let file = dir.path().join("f.py");
        fs::write(&file, "original").unwrap();

        coordinator.acquire("i-a", "f.py", "edit").unwrap();
        assert_eq!(coordinator.detect_conflict("i-a", "f.py").unwrap(), Conflict::Clean);

        // Out-of-band append, as if another tool touched the file.
        fs::write(&file, "original + external edit").unwrap();
        assert!(matches!(
            coordinator.detect_conflict("i-a", "f.py").unwrap(),
            Conflict::Detected { .. }
        ));

        // Re-acquiring captures the new fingerprint.
        coordinator.release("i-a", "f.py").unwrap();
        coordinator.acquire("i-a", "f.py", "edit again").unwrap();
        assert_eq!(coordinator.detect_conflict("i-a", "f.py").unwrap(), Conflict::Clean);
    }

    #[test]
    fn conflict_detected_when_missing_file_appears() {
        let (dir, coordinator) = test_coordinator();

        coordinator.acquire("i-a", "new_file.py", "create").unwrap();
        assert_eq!(
            coordinator.detect_conflict("i-a", "new_file.py").unwrap(),
            Conflict::Clean
        );

        fs::write(dir.path().join("new_file.py"), "someone else made it").unwrap();
        assert!(matches!(
            coordinator.detect_conflict("i-a", "new_file.py").unwrap(),
            Conflict::Detected { at_acquire: None, .. }
        ));
    }

    #[test]
    fn conflict_without_a_lock_reports_no_lock() {
        let (_dir, coordinator) = test_coordinator();
        assert_eq!(coordinator.detect_conflict("i-a", "f.py").unwrap(), Conflict::NoLock);

        coordinator.acquire("i-b", "f.py", "edit").unwrap();
        assert_eq!(coordinator.detect_conflict("i-a", "f.py").unwrap(), Conflict::NoLock);
    }

    #[test]
    fn purge_expired_removes_only_dead_locks() {
        let (_dir, coordinator) = test_coordinator();
        coordinator.acquire("i-a", "src/dead.rs", "edit").unwrap();
        coordinator.acquire("i-a", "src/live.rs", "edit").unwrap();
        expire_lock(&coordinator, "src/dead.rs");

        let purged = coordinator.purge_expired().unwrap();

        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].path, "src/dead.rs");
        assert!(coordinator.store.load_lock("src/live.rs").unwrap().is_some());
    }
}
