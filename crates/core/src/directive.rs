//! Adding or removing a directive line in the files a test report names.
//!
//! Golden files often carry marker lines such as `// FIR_IDENTICAL` that
//! switch test behavior. A directive edit selects the files whose
//! observations' `expected` text does (or does not) contain a marker, then
//! inserts the directive as the first line or drops every line equal to it.
//! All edits of one run share a single [`ApplyTransaction`] and can be
//! reverted through the undo journal like any apply.

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{load_target, FileApplyResult, FileApplyStatus};
use crate::errors::StoreError;
use crate::models::DiffObservation;
use crate::path_policy::PathPolicy;
use crate::store::{ApplyRecord, ApplyTransaction, FileStore};
use crate::text::{convert, join_lines, normalize, split_lines, LineSeparator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveAction {
    /// Insert the directive as the first line.
    Add,
    /// Remove every line equal to the directive.
    Remove,
}

impl std::fmt::Display for DirectiveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Result of one directive edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveReport {
    pub action: DirectiveAction,
    pub line: String,
    /// One entry per selected file, in first-seen order.
    pub files: Vec<FileApplyResult>,
    /// `None` for dry runs and edits that wrote nothing.
    pub record: Option<ApplyRecord>,
}

impl DirectiveReport {
    pub fn written(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileApplyStatus::Written)
            .count()
    }
}

/// A directive line to add or remove, and which files it applies to.
///
/// By default the marker is the directive line itself: `add` selects files
/// whose expected text lacks it, `remove` those whose expected text has it.
#[derive(Debug, Clone)]
pub struct DirectiveEdit {
    action: DirectiveAction,
    line: String,
    marker: String,
    policy: PathPolicy,
}

impl DirectiveEdit {
    pub fn new(action: DirectiveAction, line: impl Into<String>) -> Self {
        let line = line.into();
        Self {
            action,
            marker: line.clone(),
            line,
            policy: PathPolicy::allow_all(),
        }
    }

    pub fn add(line: impl Into<String>) -> Self {
        Self::new(DirectiveAction::Add, line)
    }

    pub fn remove(line: impl Into<String>) -> Self {
        Self::new(DirectiveAction::Remove, line)
    }

    /// Select files by `marker` instead of the directive line.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn with_policy(mut self, policy: PathPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn action(&self) -> DirectiveAction {
        self.action
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    /// Whether `obs` asks for this edit.
    pub fn selects(&self, obs: &DiffObservation) -> bool {
        let has_marker = obs.expected.contains(&self.marker);
        match self.action {
            DirectiveAction::Add => !has_marker,
            DirectiveAction::Remove => has_marker,
        }
    }

    /// Files selected by `observations`, keyed the way `store` identifies
    /// them, with the number of selecting observations each.
    pub fn select_files<S: FileStore + ?Sized>(
        &self,
        store: &S,
        observations: &[DiffObservation],
    ) -> Vec<(String, usize)> {
        let mut files: Vec<(String, usize)> = Vec::new();
        for obs in observations.iter().filter(|o| self.selects(o)) {
            let Some(path) = obs.file_path.as_deref() else {
                continue;
            };
            let key = store.key(path);
            match files.iter_mut().find(|(k, _)| *k == key) {
                Some((_, count)) => *count += 1,
                None => files.push((key, 1)),
            }
        }
        files
    }

    /// `text` with the directive applied, in `text`'s own line separator.
    /// Text that needs no change is returned as is.
    pub fn edit_text(&self, text: &str) -> String {
        let separator = LineSeparator::detect_or_default(text);
        let normalized = normalize(text);
        let lines = split_lines(&normalized);
        let present = lines.iter().any(|l| *l == self.line);

        let edited = match self.action {
            DirectiveAction::Add if present => return text.to_string(),
            DirectiveAction::Add => format!("{}\n{}", self.line, normalized),
            DirectiveAction::Remove if !present => return text.to_string(),
            DirectiveAction::Remove => {
                let kept: Vec<&str> = lines.into_iter().filter(|l| *l != self.line).collect();
                join_lines(&kept)
            }
        };
        convert(&edited, separator)
    }

    /// Edit every selected file in one transaction.
    ///
    /// Files that are missing, unreadable or rejected by the path policy
    /// are reported and skipped. Only a failed commit is an error.
    pub fn apply<S: FileStore + ?Sized>(
        &self,
        store: &S,
        observations: &[DiffObservation],
        dry_run: bool,
    ) -> Result<DirectiveReport, StoreError> {
        let targets = self.select_files(store, observations);
        let mut tx = ApplyTransaction::new(store);
        let mut files = Vec::with_capacity(targets.len());

        for (path, count) in targets {
            let current = match load_target(store, &self.policy, &path) {
                Ok(current) => current,
                Err(status) => {
                    files.push(FileApplyResult {
                        file_path: path,
                        status,
                        observations: count,
                        has_conflict: false,
                        separator: None,
                    });
                    continue;
                }
            };

            let separator = LineSeparator::detect_or_default(&current);
            let text = self.edit_text(&current);
            let status = if text == current {
                FileApplyStatus::Unchanged
            } else {
                debug!(path = %path, action = %self.action, "directive edit staged");
                if !dry_run {
                    tx.stage(path.clone(), current, text);
                }
                FileApplyStatus::Written
            };
            files.push(FileApplyResult {
                file_path: path,
                status,
                observations: count,
                has_conflict: false,
                separator: Some(separator),
            });
        }

        let record = if tx.is_empty() {
            None
        } else {
            Some(tx.commit()?)
        };
        info!(
            action = %self.action,
            line = %self.line,
            dry_run,
            files = files.len(),
            written = record.as_ref().map_or(0, |r| r.files.len()),
            "directive edit finished"
        );

        Ok(DirectiveReport {
            action: self.action,
            line: self.line.clone(),
            files,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const FIR: &str = "// FIR_IDENTICAL";

    fn obs(path: &str, expected: &str) -> DiffObservation {
        DiffObservation::new(path, expected, "actual")
    }

    #[test]
    fn test_remove_drops_every_matching_line() {
        let edit = DirectiveEdit::remove(FIR);
        assert_eq!(edit.edit_text("// FIR_IDENTICAL\nfun a()\n// FIR_IDENTICAL"), "fun a()");
        assert_eq!(edit.edit_text("fun a()"), "fun a()");
    }

    #[test]
    fn test_remove_keeps_crlf() {
        let edit = DirectiveEdit::remove(FIR);
        assert_eq!(edit.edit_text("// FIR_IDENTICAL\r\nfun a()\r\n"), "fun a()\r\n");
    }

    #[test]
    fn test_add_prepends_once() {
        let edit = DirectiveEdit::add("// LATEST_LV_DIFFERENCE");
        assert_eq!(edit.edit_text("fun a()\n"), "// LATEST_LV_DIFFERENCE\nfun a()\n");
        assert_eq!(
            edit.edit_text("// LATEST_LV_DIFFERENCE\nfun a()\n"),
            "// LATEST_LV_DIFFERENCE\nfun a()\n"
        );
        assert_eq!(edit.edit_text(""), "// LATEST_LV_DIFFERENCE\n");
    }

    #[test]
    fn test_selection_by_marker() {
        let remove = DirectiveEdit::remove(FIR).with_marker("FIR_IDENTICAL");
        assert!(remove.selects(&obs("a", "// FIR_IDENTICAL\nx")));
        assert!(!remove.selects(&obs("a", "x")));

        let add = DirectiveEdit::add("// LATEST_LV_DIFFERENCE").with_marker("LATEST_LV_DIFFERENCE");
        assert!(add.selects(&obs("a", "x")));
        assert!(!add.selects(&obs("a", "// LATEST_LV_DIFFERENCE\nx")));
    }

    #[test]
    fn test_select_files_dedups_in_first_seen_order() {
        let store = MemoryStore::new();
        let edit = DirectiveEdit::remove(FIR);
        let files = edit.select_files(
            &store,
            &[
                obs("b.kt", "// FIR_IDENTICAL"),
                obs("a.kt", "plain"),
                obs("c.kt", "// FIR_IDENTICAL"),
                obs("b.kt", "// FIR_IDENTICAL\nmore"),
                DiffObservation::without_path("// FIR_IDENTICAL", "x"),
            ],
        );
        assert_eq!(files, vec![("b.kt".to_string(), 2), ("c.kt".to_string(), 1)]);
    }

    #[test]
    fn test_apply_edits_selected_files_in_one_record() {
        let store = MemoryStore::with_files([
            ("a.kt", "// FIR_IDENTICAL\nfun a()"),
            ("b.kt", "// FIR_IDENTICAL\nfun b()"),
            ("c.kt", "// FIR_IDENTICAL\nfun c()"),
        ]);
        let report = DirectiveEdit::remove(FIR)
            .apply(
                &store,
                &[obs("a.kt", FIR), obs("b.kt", FIR), obs("c.kt", "nothing")],
                false,
            )
            .unwrap();

        assert_eq!(report.written(), 2);
        assert_eq!(report.record.as_ref().map(|r| r.files.len()), Some(2));
        assert_eq!(store.get("a.kt").as_deref(), Some("fun a()"));
        assert_eq!(store.get("b.kt").as_deref(), Some("fun b()"));
        assert_eq!(store.get("c.kt").as_deref(), Some("// FIR_IDENTICAL\nfun c()"));
    }

    #[test]
    fn test_apply_skips_missing_and_ignored() {
        let store = MemoryStore::with_files([("src/a.kt", "// FIR_IDENTICAL\nx")]);
        let report = DirectiveEdit::remove(FIR)
            .with_policy(PathPolicy::new(vec!["testData".into()], vec![], 0))
            .apply(&store, &[obs("src/a.kt", FIR), obs("testData/gone.kt", FIR)], false)
            .unwrap();

        assert!(matches!(report.files[0].status, FileApplyStatus::Ignored { .. }));
        assert_eq!(report.files[1].status, FileApplyStatus::Missing);
        assert!(report.record.is_none());
        assert_eq!(store.get("src/a.kt").as_deref(), Some("// FIR_IDENTICAL\nx"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let store = MemoryStore::with_files([("a.kt", "// FIR_IDENTICAL\nx")]);
        let report = DirectiveEdit::remove(FIR)
            .apply(&store, &[obs("a.kt", FIR)], true)
            .unwrap();
        assert_eq!(report.files[0].status, FileApplyStatus::Written);
        assert!(report.record.is_none());
        assert_eq!(store.get("a.kt").as_deref(), Some("// FIR_IDENTICAL\nx"));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = MemoryStore::with_files([("a.kt", "// FIR_IDENTICAL\na"), ("b.kt", "// FIR_IDENTICAL\nb")]);
        store.fail_writes_to("b.kt");
        let result = DirectiveEdit::remove(FIR).apply(&store, &[obs("a.kt", FIR), obs("b.kt", FIR)], false);
        assert!(matches!(result, Err(StoreError::WriteFailed { .. })));
        assert_eq!(store.get("a.kt").as_deref(), Some("// FIR_IDENTICAL\na"));
    }
}
