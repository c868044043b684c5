//! All-or-nothing writes across several files.

use tracing::{debug, error, info, warn};

use super::journal::{content_hash, ApplyRecord, JournalEntry};
use super::FileStore;
use crate::errors::StoreError;

/// One file update waiting in a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWrite {
    pub path: String,
    /// Content on disk when the write was staged.
    pub original: String,
    /// Content to write.
    pub text: String,
}

/// Stages file updates and writes them together on [`commit`](Self::commit).
///
/// Nothing reaches the store before `commit`. If a write fails part way,
/// the files already written are put back to their original content.
/// Dropping a transaction without committing discards it.
pub struct ApplyTransaction<'s, S: FileStore + ?Sized> {
    store: &'s S,
    staged: Vec<StagedWrite>,
}

impl<'s, S: FileStore + ?Sized> ApplyTransaction<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    pub fn stage(&mut self, path: impl Into<String>, original: impl Into<String>, text: impl Into<String>) {
        let write = StagedWrite {
            path: path.into(),
            original: original.into(),
            text: text.into(),
        };
        debug!(path = %write.path, "staged write");
        self.staged.push(write);
    }

    pub fn staged(&self) -> &[StagedWrite] {
        &self.staged
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Write every staged file, returning a record of what was replaced.
    pub fn commit(mut self) -> Result<ApplyRecord, StoreError> {
        let staged = std::mem::take(&mut self.staged);
        let mut written: Vec<&StagedWrite> = Vec::with_capacity(staged.len());

        for write in &staged {
            if let Err(source) = self.store.write(&write.path, &write.text) {
                error!(path = %write.path, error = %source, "write failed, rolling back");
                let unrestored = self.rollback(&written);
                if !unrestored.is_empty() {
                    return Err(StoreError::RollbackIncomplete {
                        path: write.path.clone(),
                        unrestored,
                    });
                }
                return Err(StoreError::WriteFailed {
                    path: write.path.clone(),
                    source,
                });
            }
            written.push(write);
        }

        info!(files = staged.len(), "transaction committed");
        let files = staged
            .into_iter()
            .map(|w| JournalEntry {
                written_sha256: content_hash(&w.text),
                path: w.path,
                original: w.original,
            })
            .collect();
        Ok(ApplyRecord::new(files))
    }

    /// Restore already-written files, newest first. Returns the paths that
    /// could not be restored.
    fn rollback(&self, written: &[&StagedWrite]) -> Vec<String> {
        let mut unrestored = Vec::new();
        for write in written.iter().rev() {
            if let Err(e) = self.store.write(&write.path, &write.original) {
                warn!(path = %write.path, error = %e, "failed to restore file");
                unrestored.push(write.path.clone());
            }
        }
        unrestored
    }
}

impl<S: FileStore + ?Sized> Drop for ApplyTransaction<'_, S> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            warn!(files = self.staged.len(), "transaction dropped without commit, nothing written");
        }
    }
}
