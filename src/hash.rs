//! Content fingerprints and lock-document keys.

use std::{fs, io, path::Path};

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a file's bytes, `None` when the file does not exist.
///
/// A missing file is a legitimate fingerprint: locking a path before
/// creating the file stores `None`, and conflict detection then reports a
/// conflict exactly when the file has appeared out-of-band.
pub fn content_hash(path: &Path) -> io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(digest(&bytes))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Flat, filesystem-safe key for a normalized repository path: the hex
/// SHA-256 of the path string. Two processes derive the same document name
/// for the same path without ever listing the directory.
pub fn lock_key(normalized_path: &str) -> String {
    digest(normalized_path.as_bytes())
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn missing_file_hashes_to_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(content_hash(&dir.path().join("nope.txt")).unwrap(), None);
    }

    #[test]
    fn same_bytes_same_hash() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "hello").unwrap();
        fs::write(&b, "hello").unwrap();

        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn changed_bytes_change_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello").unwrap();
        let before = content_hash(&path).unwrap();

        fs::write(&path, "hello, world").unwrap();
        let after = content_hash(&path).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn lock_keys_are_stable_and_distinct() {
        assert_eq!(lock_key("src/main.rs"), lock_key("src/main.rs"));
        assert_ne!(lock_key("src/main.rs"), lock_key("src/lib.rs"));
        // Keys are plain hex, safe as file names.
        assert!(lock_key("src/main.rs").chars().all(|c| c.is_ascii_hexdigit()));
    }
}
