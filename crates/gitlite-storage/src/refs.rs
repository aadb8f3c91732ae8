//! Git reference management.
//!
//! Branch refs are files under `refs/heads/` holding a 40-character hex id
//! and a newline. `HEAD` is a symbolic ref naming the current branch.

use crate::{ObjectId, Result, StorageError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Branch used when `HEAD` is missing.
pub const DEFAULT_BRANCH: &str = "master";

const SYMREF_PREFIX: &str = "ref: ";
const HEADS_PREFIX: &str = "refs/heads/";

/// File-backed reference store rooted at a git directory.
#[derive(Debug, Clone)]
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    /// Creates a reference store for the given git directory.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    fn ref_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('/')
            || name.split('/').any(|c| c.is_empty() || c == "." || c == "..")
        {
            return Err(StorageError::InvalidObject(format!(
                "invalid ref name: {:?}",
                name
            )));
        }
        Ok(self.git_dir.join(name))
    }

    /// Reads a direct reference; `None` if it does not exist yet.
    pub fn read(&self, name: &str) -> Result<Option<ObjectId>> {
        let path = self.ref_path(name)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ObjectId::from_hex(content.trim_end()).map(Some)
    }

    /// Atomically points a reference at an object.
    pub fn write(&self, name: &str, id: &ObjectId) -> Result<()> {
        let path = self.ref_path(name)?;
        write_atomic(&path, format!("{}\n", id).as_bytes())?;
        tracing::debug!(name = %name, id = %id, "updated ref");
        Ok(())
    }

    /// Returns the branch `HEAD` points at, e.g. `master`.
    pub fn head_branch(&self) -> Result<String> {
        let content = match fs::read_to_string(self.git_dir.join("HEAD")) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DEFAULT_BRANCH.to_string()),
            Err(e) => return Err(e.into()),
        };
        content
            .trim_end()
            .strip_prefix(SYMREF_PREFIX)
            .and_then(|target| target.strip_prefix(HEADS_PREFIX))
            .map(str::to_string)
            .ok_or_else(|| {
                StorageError::InvalidObject(format!("HEAD is not a branch ref: {:?}", content))
            })
    }

    /// Points `HEAD` at a branch.
    pub fn set_head_branch(&self, branch: &str) -> Result<()> {
        let target = branch_ref(branch);
        self.ref_path(&target)?;
        write_atomic(
            &self.git_dir.join("HEAD"),
            format!("{}{}\n", SYMREF_PREFIX, target).as_bytes(),
        )
    }
}

/// Full ref name of a branch.
pub fn branch_ref(branch: &str) -> String {
    format!("{}{}", HEADS_PREFIX, branch)
}

/// Replaces `path` with `contents` via a temporary file in the same directory.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::InvalidObject(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ref_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = RefStore::new(dir.path());
        let id = ObjectId::from_hex("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3").unwrap();

        store.write("refs/heads/main", &id).unwrap();
        assert_eq!(store.read("refs/heads/main").unwrap(), Some(id));

        let raw = fs::read_to_string(dir.path().join("refs/heads/main")).unwrap();
        assert_eq!(raw, "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3\n");
    }

    #[test]
    fn test_ref_update() {
        let dir = TempDir::new().unwrap();
        let store = RefStore::new(dir.path());
        let id1 = ObjectId::from_bytes([1u8; 20]);
        let id2 = ObjectId::from_bytes([2u8; 20]);

        store.write("refs/heads/main", &id1).unwrap();
        store.write("refs/heads/main", &id2).unwrap();
        assert_eq!(store.read("refs/heads/main").unwrap(), Some(id2));
    }

    #[test]
    fn test_ref_not_found() {
        let dir = TempDir::new().unwrap();
        let store = RefStore::new(dir.path());
        assert_eq!(store.read("refs/heads/nonexistent").unwrap(), None);
    }

    #[test]
    fn test_ref_garbage_content() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/main"), "not a hash\n").unwrap();
        let store = RefStore::new(dir.path());
        assert!(store.read("refs/heads/main").is_err());
    }

    #[test]
    fn test_invalid_ref_names() {
        let dir = TempDir::new().unwrap();
        let store = RefStore::new(dir.path());
        for name in ["", "/etc/passwd", "refs/../HEAD", "refs//x", "refs/heads/"] {
            assert!(store.read(name).is_err(), "{:?} accepted", name);
        }
    }

    #[test]
    fn test_head_branch_default() {
        let dir = TempDir::new().unwrap();
        let store = RefStore::new(dir.path());
        assert_eq!(store.head_branch().unwrap(), DEFAULT_BRANCH);
    }

    #[test]
    fn test_set_head_branch() {
        let dir = TempDir::new().unwrap();
        let store = RefStore::new(dir.path());
        store.set_head_branch("feature").unwrap();

        let raw = fs::read_to_string(dir.path().join("HEAD")).unwrap();
        assert_eq!(raw, "ref: refs/heads/feature\n");
        assert_eq!(store.head_branch().unwrap(), "feature");
    }

    #[test]
    fn test_detached_head_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("HEAD"), format!("{}\n", "ab".repeat(20))).unwrap();
        let store = RefStore::new(dir.path());
        assert!(store.head_branch().is_err());
    }

    #[test]
    fn test_branch_ref() {
        assert_eq!(branch_ref("main"), "refs/heads/main");
    }
}
