//! Storage for golden files.
//!
//! A [`FileStore`] is the sink an apply writes resolved text into. Writes
//! are staged in an [`ApplyTransaction`] so that an apply either lands on
//! every file or on none of them, and each committed transaction leaves an
//! [`ApplyRecord`] the [`UndoJournal`] can revert.

pub mod journal;
pub mod transaction;

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, trace};

pub use journal::{ApplyRecord, JournalEntry, UndoJournal};
pub use transaction::{ApplyTransaction, StagedWrite};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Read/write access to the files a test report refers to.
pub trait FileStore: Send + Sync {
    /// Current content of `path`, or `None` when the file does not exist.
    fn read(&self, path: &str) -> io::Result<Option<String>>;

    /// Replace the content of an existing file.
    fn write(&self, path: &str, text: &str) -> io::Result<()>;

    /// Identity of the file `path` names. Two spellings of the same file
    /// share one key.
    fn key(&self, path: &str) -> String {
        path.to_string()
    }

    /// `path` as it should be matched against the path policy: relative to
    /// the store root, with forward slashes.
    fn relative(&self, path: &str) -> String {
        self.key(path).replace('\\', "/")
    }
}

// ---------------------------------------------------------------------------
// Disk
// ---------------------------------------------------------------------------

/// A store backed by the filesystem, rooted at a workspace directory.
///
/// Relative paths resolve against the root; absolute paths are used as-is.
/// Writes go to a temporary file in the target directory which is then
/// renamed over the original.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

/// Absolute form of `path` with `.` and `..` components folded away.
/// Symlinks are not followed.
fn lexical_absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl FileStore for DiskStore {
    fn read(&self, path: &str) -> io::Result<Option<String>> {
        let full = self.resolve(path);
        match std::fs::read_to_string(&full) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!(path = %full.display(), "file does not exist");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &str, text: &str) -> io::Result<()> {
        let full = self.resolve(path);
        let dir = full
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        // The temp file is created owner-only; carry the target's mode over
        // so the rename does not change it.
        let permissions = match std::fs::metadata(&full) {
            Ok(meta) => Some(meta.permissions()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        if let Some(permissions) = permissions {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&full).map_err(|e| e.error)?;

        debug!(path = %full.display(), bytes = text.len(), "file written");
        Ok(())
    }

    /// Workspace-relative path with forward slashes, or the absolute path
    /// for files outside the workspace.
    fn key(&self, path: &str) -> String {
        let full = lexical_absolute(&self.resolve(path));
        let root = lexical_absolute(&self.root);
        match full.strip_prefix(&root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => full.to_string_lossy().into_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// An in-memory store for tests and dry runs.
///
/// Individual paths can be made to fail on write to exercise rollback.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, K, V>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (path, text) in files {
            store.insert(path, text);
        }
        store
    }

    /// Create or overwrite a file directly, bypassing failure injection.
    pub fn insert(&self, path: impl Into<String>, text: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), text.into());
    }

    /// Make every subsequent write to `path` fail.
    pub fn fail_writes_to(&self, path: impl Into<String>) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

impl FileStore for MemoryStore {
    fn read(&self, path: &str) -> io::Result<Option<String>> {
        Ok(self.get(path))
    }

    fn write(&self, path: &str, text: &str) -> io::Result<()> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path);
        if failing {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("write to '{}' rejected", path),
            ));
        }

        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        match files.get_mut(path) {
            Some(existing) => {
                *existing = text.to_string();
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("'{}' does not exist", path),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_store_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        assert_eq!(store.read("nope.txt").unwrap(), None);
    }

    #[test]
    fn test_disk_store_write_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("testData")).unwrap();
        std::fs::write(dir.path().join("testData/a.txt"), "old").unwrap();

        let store = DiskStore::new(dir.path());
        store.write("testData/a.txt", "A\r\nB\r\n").unwrap();

        let bytes = std::fs::read(dir.path().join("testData/a.txt")).unwrap();
        assert_eq!(bytes, b"A\r\nB\r\n");
        assert_eq!(store.read("testData/a.txt").unwrap().as_deref(), Some("A\r\nB\r\n"));
    }

    #[test]
    fn test_disk_store_absolute_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abs.txt");
        std::fs::write(&file, "x").unwrap();

        let store = DiskStore::new("/somewhere/else");
        let abs = file.to_string_lossy().to_string();
        assert_eq!(store.read(&abs).unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_disk_store_relative() {
        let store = DiskStore::new("/work");
        assert_eq!(store.relative("/work/testData/a.txt"), "testData/a.txt");
        assert_eq!(store.relative("testData/b.txt"), "testData/b.txt");
        assert_eq!(store.relative("/other/c.txt"), "/other/c.txt");
    }

    #[test]
    fn test_disk_store_key_unifies_spellings() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        let abs = dir.path().join("testData/a.txt").to_string_lossy().to_string();

        assert_eq!(store.key("testData/a.txt"), "testData/a.txt");
        assert_eq!(store.key("./testData/a.txt"), "testData/a.txt");
        assert_eq!(store.key("testData/sub/../a.txt"), "testData/a.txt");
        assert_eq!(store.key(&abs), "testData/a.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_store_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        let script = dir.path().join("run.sh");
        std::fs::write(&plain, "old").unwrap();
        std::fs::write(&script, "old").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = DiskStore::new(dir.path());
        store.write("a.txt", "new").unwrap();
        store.write("run.sh", "new").unwrap();

        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&plain), 0o644);
        assert_eq!(mode(&script), 0o755);
        assert_eq!(std::fs::read_to_string(&plain).unwrap(), "new");
    }

    #[test]
    fn test_disk_store_read_invalid_utf8_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bin.txt"), [0xff, 0xfe, 0x00]).unwrap();

        let store = DiskStore::new(dir.path());
        let err = store.read("bin.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_memory_store_write_requires_existing_file() {
        let store = MemoryStore::with_files([("a.txt", "1")]);
        store.write("a.txt", "2").unwrap();
        assert_eq!(store.get("a.txt").as_deref(), Some("2"));

        let err = store.write("b.txt", "x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_memory_store_failure_injection() {
        let store = MemoryStore::with_files([("a.txt", "1")]);
        store.fail_writes_to("a.txt");
        assert!(store.write("a.txt", "2").is_err());
        assert_eq!(store.get("a.txt").as_deref(), Some("1"));
    }
}
