//! Undo journal for applies.
//!
//! Every committed apply is appended to `journal.json` in the state
//! directory as an [`ApplyRecord`]. Undo pops the newest record and writes
//! the original content of each of its files back, after checking (by
//! SHA-256) that nobody edited those files since.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::transaction::ApplyTransaction;
use super::FileStore;
use crate::errors::{JournalError, StoreError};

const JOURNAL_FILE: &str = "journal.json";

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// One file touched by an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub path: String,
    /// Content before the apply.
    pub original: String,
    /// Hash of the content the apply wrote.
    pub written_sha256: String,
}

/// A committed apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    pub id: String,
    pub applied_at: DateTime<Utc>,
    pub files: Vec<JournalEntry>,
}

impl ApplyRecord {
    pub fn new(files: Vec<JournalEntry>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            applied_at: Utc::now(),
            files,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    #[serde(default)]
    records: Vec<ApplyRecord>,
}

/// The on-disk list of applies that can still be undone.
#[derive(Debug, Clone)]
pub struct UndoJournal {
    path: PathBuf,
}

impl UndoJournal {
    /// A journal stored in `state_dir`. The directory is created on the
    /// first write.
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(JOURNAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first. A missing journal is empty.
    pub fn records(&self) -> Result<Vec<ApplyRecord>, JournalError> {
        Ok(self.load()?.records)
    }

    pub fn latest(&self) -> Result<Option<ApplyRecord>, JournalError> {
        Ok(self.load()?.records.pop())
    }

    /// Record a committed apply. Records without files are not stored.
    pub fn append(&self, record: ApplyRecord) -> Result<(), JournalError> {
        if record.files.is_empty() {
            return Ok(());
        }
        let mut journal = self.load()?;
        info!(id = %record.id, files = record.files.len(), "recording apply");
        journal.records.push(record);
        self.save(&journal)
    }

    /// Revert the newest apply as one step.
    ///
    /// Fails without touching any file if one of them changed since the
    /// apply, unless `force` is set.
    pub fn undo<S: FileStore + ?Sized>(&self, store: &S, force: bool) -> Result<ApplyRecord, JournalError> {
        let mut journal = self.load()?;
        let record = journal.records.pop().ok_or(JournalError::Empty)?;

        let mut tx = ApplyTransaction::new(store);
        for entry in &record.files {
            let current = store
                .read(&entry.path)
                .map_err(|source| StoreError::ReadFailed {
                    path: entry.path.clone(),
                    source,
                })?;

            let unchanged = current
                .as_deref()
                .is_some_and(|text| content_hash(text) == entry.written_sha256);
            if !unchanged {
                if !force {
                    return Err(JournalError::ModifiedSinceApply(entry.path.clone()));
                }
                warn!(path = %entry.path, "file modified since apply, overwriting");
            }

            tx.stage(entry.path.clone(), current.unwrap_or_default(), entry.original.clone());
        }
        tx.commit()?;

        self.save(&journal)?;
        info!(id = %record.id, files = record.files.len(), "apply undone");
        Ok(record)
    }

    fn load(&self) -> Result<JournalFile, JournalError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no undo journal yet");
            return Ok(JournalFile::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| JournalError::ParseError(e.to_string()))
    }

    fn save(&self, journal: &JournalFile) -> Result<(), JournalError> {
        let dir = self
            .path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(journal)
            .map_err(|e| JournalError::ParseError(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), records = journal.records.len(), "undo journal saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn applied(store: &MemoryStore, path: &str, original: &str, text: &str) -> ApplyRecord {
        let mut tx = ApplyTransaction::new(store);
        tx.stage(path, original, text);
        tx.commit().unwrap()
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_undo_restores_latest_apply() {
        let dir = tempfile::tempdir().unwrap();
        let journal = UndoJournal::new(dir.path().join("state"));
        let store = MemoryStore::with_files([("a.txt", "v0")]);

        journal.append(applied(&store, "a.txt", "v0", "v1")).unwrap();
        journal.append(applied(&store, "a.txt", "v1", "v2")).unwrap();
        assert_eq!(journal.records().unwrap().len(), 2);

        journal.undo(&store, false).unwrap();
        assert_eq!(store.get("a.txt").as_deref(), Some("v1"));
        journal.undo(&store, false).unwrap();
        assert_eq!(store.get("a.txt").as_deref(), Some("v0"));

        assert!(matches!(journal.undo(&store, false), Err(JournalError::Empty)));
    }

    #[test]
    fn test_undo_refuses_modified_file() {
        let dir = tempfile::tempdir().unwrap();
        let journal = UndoJournal::new(dir.path());
        let store = MemoryStore::with_files([("a.txt", "v0"), ("b.txt", "w0")]);

        let mut tx = ApplyTransaction::new(&store);
        tx.stage("a.txt", "v0", "v1");
        tx.stage("b.txt", "w0", "w1");
        journal.append(tx.commit().unwrap()).unwrap();

        store.insert("b.txt", "edited by hand");
        let err = journal.undo(&store, false).unwrap_err();
        assert!(matches!(err, JournalError::ModifiedSinceApply(ref p) if p == "b.txt"));
        // Nothing restored, record still present.
        assert_eq!(store.get("a.txt").as_deref(), Some("v1"));
        assert_eq!(journal.records().unwrap().len(), 1);

        journal.undo(&store, true).unwrap();
        assert_eq!(store.get("a.txt").as_deref(), Some("v0"));
        assert_eq!(store.get("b.txt").as_deref(), Some("w0"));
        assert!(journal.records().unwrap().is_empty());
    }

    #[test]
    fn test_empty_record_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let journal = UndoJournal::new(dir.path());
        journal.append(ApplyRecord::new(Vec::new())).unwrap();
        assert!(!journal.path().exists());
        assert!(journal.latest().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = UndoJournal::new(dir.path());
        std::fs::write(journal.path(), "not json").unwrap();
        assert!(matches!(journal.records(), Err(JournalError::ParseError(_))));
    }
}
