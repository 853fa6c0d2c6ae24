//! Filesystem document store for coordination state.
//!
//! All shared state lives as plain JSON documents under one state root:
//!
//! ```text
//! <root>/
//!   registry.json        # all registered instances
//!   registry.json.lock   # guard for registry read-modify-write
//!   locks/<key>.json     # one document per locked path
//!   heartbeats/<id>.json # one liveness document per instance
//!   decisions.jsonl      # append-only decision log
//!   sweep.stamp          # mtime marker: when the last stale sweep ran
//! ```
//!
//! Documents are human-readable and human-deletable on purpose: removing a
//! lock or heartbeat file by hand is the supported recovery path, and every
//! operation tolerates records vanishing underneath it. Three primitives
//! keep concurrent processes from corrupting each other:
//!
//! - **Replace** — write to a temp file in the same directory, then rename.
//!   Readers see the old document or the new one, never a torn write.
//! - **Create-if-absent** — write to a temp file, then `hard_link` it to
//!   the final name. Exactly one of two racing creators wins, and the
//!   document is complete the instant it appears.
//! - **Guard** — an `O_EXCL`-style `.lock` file serializing read-modify-write
//!   on multi-record documents. A guard left behind by a crashed process is
//!   stolen after a grace period.

mod decision;
mod heartbeat;
mod lock;
mod registry;

use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

// Trait must be in scope for `.write_all()` on File.
use io::Write;

use serde::{Serialize, de::DeserializeOwned};

/// Errors that can occur during storage operations.
///
/// These are the fatal failures — disk trouble, corrupt documents, a guard
/// that never frees. Protocol conditions (lock held, lease expired) are
/// ordinary return values, not errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt document {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("guard {0} is still held after retries; delete it by hand if its owner crashed")]
    GuardBusy(PathBuf),

    #[error("gave up acquiring lock on {0}: the lock document kept changing underneath us")]
    Contended(String),

    #[error("invalid path {0:?}: must be relative, inside the tree, and non-empty")]
    InvalidPath(String),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// How long a guard may sit unreleased before it is presumed leaked by a
/// crashed process and stolen.
const GUARD_STALE: Duration = Duration::from_secs(10);

/// Pause between attempts to take a busy guard.
const GUARD_RETRY: Duration = Duration::from_millis(25);

/// Attempts before giving up on a guard (~5 s total).
const GUARD_ATTEMPTS: u32 = 200;

/// File-based document store rooted at the shared state directory.
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Opens a store rooted at the given directory.
    ///
    /// The directory and its subdirectories are created if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("locks"))?;
        fs::create_dir_all(root.join("heartbeats"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Document paths ──

    pub(crate) fn registry_path(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub(crate) fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join("locks").join(format!("{key}.json"))
    }

    pub(crate) fn heartbeat_path(&self, instance_id: &str) -> PathBuf {
        self.root.join("heartbeats").join(format!("{instance_id}.json"))
    }

    pub(crate) fn decisions_path(&self) -> PathBuf {
        self.root.join("decisions.jsonl")
    }

    fn stamp_path(&self) -> PathBuf {
        self.root.join("sweep.stamp")
    }

    // ── Document primitives ──

    /// Reads and parses a document. `None` when the file doesn't exist.
    ///
    /// A document that exists but won't parse is corrupt, which is fatal:
    /// the caller can't tell live state from garbage, and the documented
    /// recovery is a human deleting the file.
    pub(crate) fn read_doc<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let json = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&json) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => Err(StorageError::Corrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }),
        }
    }

    /// Replaces a document atomically: temp file in the same directory,
    /// then rename over the target.
    pub(crate) fn write_doc<T: Serialize>(&self, path: &Path, doc: &T) -> Result<()> {
        let tmp = tmp_sibling(path);
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, json)?;
        match fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e.into())
            }
        }
    }

    /// Creates a document only if none exists, atomically and with its
    /// full contents: the serialized bytes go to a temp file which is then
    /// hard-linked to the final name. Returns `false` when the document
    /// already existed (the link fails, nothing changes).
    pub(crate) fn create_doc<T: Serialize>(&self, path: &Path, doc: &T) -> Result<bool> {
        let tmp = tmp_sibling(path);
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, json)?;
        let outcome = match fs::hard_link(&tmp, path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        };
        let _ = fs::remove_file(&tmp);
        outcome
    }

    /// Deletes a document. Deleting one that is already gone is success
    /// (`false`), so concurrent sweeps can race freely.
    pub(crate) fn remove_doc(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Acquires the exclusive guard for a document, retrying while some
    /// other process holds it and stealing it once it looks abandoned.
    pub(crate) fn guard(&self, doc_path: &Path) -> Result<Guard> {
        let mut path = doc_path.as_os_str().to_owned();
        path.push(".lock");
        let path = PathBuf::from(path);

        for _ in 0..GUARD_ATTEMPTS {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // The pid makes a leaked guard attributable when
                    // someone inspects the state directory by hand.
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(Guard { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if guard_age(&path) > GUARD_STALE {
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    thread::sleep(GUARD_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::GuardBusy(path))
    }

    // ── Sweep stamp ──

    /// Age of the last stale sweep, `None` if one has never run.
    pub(crate) fn sweep_stamp_age(&self) -> Option<Duration> {
        let modified = fs::metadata(self.stamp_path()).and_then(|m| m.modified()).ok()?;
        modified.elapsed().ok()
    }

    /// Records that a sweep just ran.
    pub(crate) fn touch_sweep_stamp(&self) -> Result<()> {
        fs::write(self.stamp_path(), b"")?;
        Ok(())
    }
}

/// Exclusive guard over one document's read-modify-write window.
///
/// Released on drop by deleting the guard file. A crash before drop leaves
/// the file behind; the next acquirer steals it after [`GUARD_STALE`].
pub(crate) struct Guard {
    path: PathBuf,
}

impl Drop for Guard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Age of a guard file. Treated as zero when the file vanished between the
/// failed create and this check, or when mtime arithmetic fails — either
/// way the acquirer just retries.
fn guard_age(path: &Path) -> Duration {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .unwrap_or(Duration::ZERO)
}

/// Temp-file name next to the target, unique per process so two writers
/// never stomp each other's staging file.
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
    name.push(format!(".tmp-{}", std::process::id()));
    path.with_file_name(name)
}

/// Normalizes a repository-relative path for use as a lock key.
///
/// Strips `./` segments and duplicate separators so `./src//main.rs` and
/// `src/main.rs` name the same lock. Rejects empty, absolute, and
/// parent-traversing paths — locks name files inside the tree.
pub fn normalize_path(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('/') {
        return Err(StorageError::InvalidPath(raw.to_string()));
    }
    let mut parts = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(StorageError::InvalidPath(raw.to_string())),
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(StorageError::InvalidPath(raw.to_string()));
    }
    Ok(parts.join("/"))
}
