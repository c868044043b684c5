//! Path-policy enforcement for applies.
//!
//! Provides [`PathPolicy`] which encapsulates the `[paths]` config section
//! and decides whether a golden file named by a test report may be updated.
//!
//! # Decision model
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | Roots configured and path under none of them | `OutsideTestData` |
//! | Path matches an ignore pattern | `Ignored` |
//! | Current size exceeds `max_file_size` (when > 0) | `Oversize` |
//! | None of the above | `Allow` |

use tracing::debug;

use crate::config::PathsConfig;

// ---------------------------------------------------------------------------
// Decision enum
// ---------------------------------------------------------------------------

/// The outcome of evaluating a path against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathDecision {
    /// The file may be updated.
    Allow,
    /// The path lies outside every configured test-data root.
    OutsideTestData,
    /// The path matches an ignore pattern.
    Ignored { pattern: String },
    /// The file on disk exceeds the configured size limit.
    Oversize { size: u64, limit: u64 },
}

impl PathDecision {
    pub fn should_apply(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Short human-readable label for reports and logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::OutsideTestData => "outside-test-data",
            Self::Ignored { .. } => "ignored",
            Self::Oversize { .. } => "oversize",
        }
    }
}

impl std::fmt::Display for PathDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "allowed"),
            Self::OutsideTestData => write!(f, "outside test-data roots"),
            Self::Ignored { pattern } => write!(f, "matches ignore pattern '{}'", pattern),
            Self::Oversize { size, limit } => {
                write!(f, "{} bytes exceeds limit of {} bytes", size, limit)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PathPolicy
// ---------------------------------------------------------------------------

/// Evaluates golden-file paths against test-data roots, ignore patterns,
/// and a size limit.
#[derive(Debug, Clone, Default)]
pub struct PathPolicy {
    /// Directory prefixes that hold test data. Empty = everywhere.
    test_data_roots: Vec<String>,
    /// Glob patterns to exclude. Matched against the *relative* path.
    ignore_patterns: Vec<String>,
    /// Maximum file size in bytes. 0 = no limit.
    max_file_size: u64,
}

impl PathPolicy {
    pub fn new(test_data_roots: Vec<String>, ignore_patterns: Vec<String>, max_file_size: u64) -> Self {
        Self {
            test_data_roots: test_data_roots.iter().map(|r| normalize_path(r)).collect(),
            ignore_patterns,
            max_file_size,
        }
    }

    /// A policy that allows every path.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Evaluate a path relative to the workspace, given the size of the
    /// file currently on disk.
    pub fn evaluate(&self, rel_path: &str, size: u64) -> PathDecision {
        let path = normalize_path(rel_path);

        if !self.test_data_roots.is_empty() && !self.test_data_roots.iter().any(|r| is_under(&path, r)) {
            debug!(path = %path, "path outside test-data roots");
            return PathDecision::OutsideTestData;
        }

        for pattern in &self.ignore_patterns {
            if glob_match::glob_match(&pattern.replace('\\', "/"), &path) {
                debug!(path = %path, pattern = pattern.as_str(), "path matches ignore pattern");
                return PathDecision::Ignored {
                    pattern: pattern.clone(),
                };
            }
        }

        if self.max_file_size > 0 && size > self.max_file_size {
            debug!(path = %path, size, limit = self.max_file_size, "file exceeds max_file_size");
            return PathDecision::Oversize {
                size,
                limit: self.max_file_size,
            };
        }

        PathDecision::Allow
    }

    /// Whether the policy has any constraints at all.
    pub fn has_constraints(&self) -> bool {
        !self.test_data_roots.is_empty() || !self.ignore_patterns.is_empty() || self.max_file_size > 0
    }
}

impl From<&PathsConfig> for PathPolicy {
    fn from(paths: &PathsConfig) -> Self {
        Self::new(
            paths.test_data_roots.clone(),
            paths.ignore_patterns.clone(),
            paths.max_file_size,
        )
    }
}

/// Forward slashes, no leading `./`, no trailing `/`.
fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.strip_prefix("./").unwrap_or(&path);
    path.trim_end_matches('/').to_string()
}

/// `path` equals `root` or lies beneath it, comparing whole components.
fn is_under(path: &str, root: &str) -> bool {
    if root.is_empty() || root == "." {
        return true;
    }
    path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
