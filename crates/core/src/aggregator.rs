//! Folds diff observations from test runs into golden-file updates.
//!
//! Observations are grouped per file. A file with a single distinct
//! `actual` simply takes it. A file with several is reconciled by folding
//! each later `actual` into the first one through a three-way merge whose
//! base is the first observation's `expected`:
//!
//! ```text
//! acc = obs[0].actual
//! for obs in obs[1..]:  acc = merge(acc, obs[0].expected, obs.actual)
//! ```
//!
//! All updates of one apply are written through a single
//! [`ApplyTransaction`], each file keeping its own line separator.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::StoreError;
use crate::merge::Merger;
use crate::models::DiffObservation;
use crate::path_policy::PathPolicy;
use crate::store::{ApplyRecord, ApplyTransaction, FileStore};
use crate::text::{convert, normalize, LineSeparator};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Aggregate result of one apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Every file was updated without conflicts.
    Success,
    /// No observation named a file.
    NoDiffs,
    /// At least one file now contains conflict markers.
    HasConflict,
}

impl std::fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NoDiffs => write!(f, "no diffs"),
            Self::HasConflict => write!(f, "conflict"),
        }
    }
}

/// The resolved update for one file, before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdatePlan {
    pub file_path: String,
    /// Distinct observations in first-seen order.
    pub observations: Vec<DiffObservation>,
    /// Resolved text with `\n` separators.
    pub text: String,
    pub has_conflict: bool,
}

/// What happened to one file during an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileApplyStatus {
    /// The file was rewritten.
    Written,
    /// The resolved text already matched the file.
    Unchanged,
    /// The path does not resolve to an existing file.
    Missing,
    /// The file exists but could not be read as text.
    Unreadable { reason: String },
    /// The path policy rejected the file.
    Ignored { reason: String },
}

impl FileApplyStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Unchanged => "unchanged",
            Self::Missing => "missing",
            Self::Unreadable { .. } => "unreadable",
            Self::Ignored { .. } => "ignored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileApplyResult {
    pub file_path: String,
    #[serde(flatten)]
    pub status: FileApplyStatus,
    /// Number of distinct observations folded into the update.
    pub observations: usize,
    pub has_conflict: bool,
    /// Separator the file was written with.
    pub separator: Option<LineSeparator>,
}

/// Summary of one apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    pub files: Vec<FileApplyResult>,
    /// Record of the committed writes, `None` for dry runs and applies
    /// that wrote nothing.
    pub record: Option<ApplyRecord>,
}

impl ApplyReport {
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, FileApplyStatus::Written))
    }

    pub fn conflicts(&self) -> usize {
        self.files.iter().filter(|f| f.has_conflict).count()
    }

    fn count(&self, pred: impl Fn(&FileApplyStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Group observations by file, in first-seen order of files, dropping
/// observations without a path and repeated `actual` values (first wins).
pub fn group_observations(observations: &[DiffObservation]) -> Vec<(String, Vec<DiffObservation>)> {
    group_observations_by(observations, str::to_string)
}

/// Like [`group_observations`], but paths with the same `key` form one
/// group named by that key.
pub fn group_observations_by<F>(
    observations: &[DiffObservation],
    key: F,
) -> Vec<(String, Vec<DiffObservation>)>
where
    F: Fn(&str) -> String,
{
    let mut groups: Vec<(String, Vec<DiffObservation>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for obs in observations {
        let Some(path) = obs.file_path.as_deref() else {
            continue;
        };
        let path = key(path);
        let slot = *index.entry(path.clone()).or_insert_with(|| {
            groups.push((path, Vec::new()));
            groups.len() - 1
        });
        let group = &mut groups[slot].1;
        if !group.iter().any(|seen| seen.actual == obs.actual) {
            group.push(obs.clone());
        }
    }
    groups
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Turns a batch of observations into file updates.
pub struct Aggregator {
    merger: Merger,
    policy: PathPolicy,
}

impl Aggregator {
    pub fn new(merger: Merger, policy: PathPolicy) -> Self {
        Self { merger, policy }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Merger::new(config.merge.resolver.build()),
            PathPolicy::from(&config.paths),
        )
    }

    /// Resolve one file's observations into its final text.
    ///
    /// `observations` must be non-empty and distinct by `actual`.
    pub fn resolve(&self, observations: &[DiffObservation]) -> (String, bool) {
        let Some((first, rest)) = observations.split_first() else {
            return (String::new(), false);
        };
        if rest.is_empty() {
            return (normalize(&first.actual), false);
        }

        let base = normalize(&first.expected);
        let (text, has_conflict) = rest.iter().fold(
            (normalize(&first.actual), false),
            |(acc, conflicted), obs| {
                let merged = self.merger.three_way_merge(&acc, &base, &normalize(&obs.actual));
                let conflicted = conflicted || merged.has_conflicts();
                (merged.text, conflicted)
            },
        );
        (text, has_conflict)
    }

    /// Compute every file update without touching any store.
    pub fn plan(&self, observations: &[DiffObservation]) -> Vec<FileUpdatePlan> {
        self.plan_groups(group_observations(observations))
    }

    /// Compute every file update, treating paths `store` maps to the same
    /// file as one file. Nothing is read or written.
    pub fn plan_for<S: FileStore + ?Sized>(
        &self,
        store: &S,
        observations: &[DiffObservation],
    ) -> Vec<FileUpdatePlan> {
        self.plan_groups(group_observations_by(observations, |p| store.key(p)))
    }

    fn plan_groups(&self, groups: Vec<(String, Vec<DiffObservation>)>) -> Vec<FileUpdatePlan> {
        groups
            .into_iter()
            .map(|(file_path, observations)| {
                let (text, has_conflict) = self.resolve(&observations);
                debug!(
                    path = %file_path,
                    observations = observations.len(),
                    has_conflict,
                    "planned file update"
                );
                FileUpdatePlan {
                    file_path,
                    observations,
                    text,
                    has_conflict,
                }
            })
            .collect()
    }

    /// Resolve and write every update in one transaction.
    ///
    /// With `dry_run` the statuses are computed but nothing is written.
    /// Missing, unreadable and policy-rejected files are skipped and do not
    /// count towards the outcome's conflict flag. Only a failed commit is an
    /// error.
    pub fn apply<S: FileStore + ?Sized>(
        &self,
        store: &S,
        observations: &[DiffObservation],
        dry_run: bool,
    ) -> Result<ApplyReport, StoreError> {
        let plans = self.plan_for(store, observations);
        if plans.is_empty() {
            info!(observations = observations.len(), "no observation names a file");
            return Ok(ApplyReport {
                outcome: ApplyOutcome::NoDiffs,
                files: Vec::new(),
                record: None,
            });
        }

        let mut tx = ApplyTransaction::new(store);
        let mut files = Vec::with_capacity(plans.len());
        let mut has_conflict = false;

        for plan in plans {
            let observations = plan.observations.len();
            let current = match load_target(store, &self.policy, &plan.file_path) {
                Ok(current) => current,
                Err(status) => {
                    files.push(FileApplyResult {
                        file_path: plan.file_path,
                        status,
                        observations,
                        has_conflict: false,
                        separator: None,
                    });
                    continue;
                }
            };

            has_conflict |= plan.has_conflict;
            let separator = LineSeparator::detect_or_default(&current);
            let text = convert(&plan.text, separator);

            let status = if text == current {
                FileApplyStatus::Unchanged
            } else {
                if !dry_run {
                    tx.stage(plan.file_path.clone(), current, text);
                }
                FileApplyStatus::Written
            };
            files.push(FileApplyResult {
                file_path: plan.file_path,
                status,
                observations,
                has_conflict: plan.has_conflict,
                separator: Some(separator),
            });
        }

        let record = if tx.is_empty() {
            None
        } else {
            Some(tx.commit()?)
        };

        let outcome = if has_conflict {
            ApplyOutcome::HasConflict
        } else {
            ApplyOutcome::Success
        };
        info!(
            outcome = %outcome,
            dry_run,
            files = files.len(),
            written = record.as_ref().map_or(0, |r| r.files.len()),
            "apply finished"
        );

        Ok(ApplyReport {
            outcome,
            files,
            record,
        })
    }
}

/// Current content of a file about to be updated, or the status saying
/// why it is skipped.
pub(crate) fn load_target<S: FileStore + ?Sized>(
    store: &S,
    policy: &PathPolicy,
    path: &str,
) -> Result<String, FileApplyStatus> {
    let current = match store.read(path) {
        Ok(Some(text)) => text,
        Ok(None) => {
            debug!(path, "file does not exist, skipping");
            return Err(FileApplyStatus::Missing);
        }
        Err(e) => {
            warn!(path, error = %e, "file could not be read, skipping");
            return Err(FileApplyStatus::Unreadable {
                reason: e.to_string(),
            });
        }
    };

    let decision = policy.evaluate(&store.relative(path), current.len() as u64);
    if !decision.should_apply() {
        warn!(path, decision = decision.label(), "file skipped by path policy");
        return Err(FileApplyStatus::Ignored {
            reason: decision.to_string(),
        });
    }
    Ok(current)
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(Merger::default(), PathPolicy::allow_all())
    }
}
