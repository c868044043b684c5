//! Domain model types used throughout goldmerge.
//!
//! A test run produces a [`TestReport`]: a tree of [`TestNode`]s whose
//! leaves carry the expected-vs-actual comparisons ([`DiffObservation`])
//! recorded against golden test-data files.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ReportError;

// ---------------------------------------------------------------------------
// Diff observation
// ---------------------------------------------------------------------------

/// One expected-vs-actual comparison from a single test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffObservation {
    /// Golden file the comparison was made against. Observations without a
    /// path cannot be applied and are discarded.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Golden content at the time of the run.
    pub expected: String,
    /// Content the test produced.
    pub actual: String,
}

impl DiffObservation {
    pub fn new(
        file_path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            file_path: Some(file_path.into()),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// An observation that is not attached to any file.
    pub fn without_path(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            file_path: None,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Test-result tree
// ---------------------------------------------------------------------------

/// Outcome of a single test node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Ignored,
    Error,
}

impl TestStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Passed | Self::Ignored)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Ignored => write!(f, "ignored"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A suite or test in the result tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNode {
    pub name: String,
    pub status: TestStatus,
    /// Comparisons recorded by this test. Only read on leaves.
    #[serde(default)]
    pub diffs: Vec<DiffObservation>,
    #[serde(default)]
    pub children: Vec<TestNode>,
}

impl TestNode {
    pub fn leaf(name: impl Into<String>, status: TestStatus, diffs: Vec<DiffObservation>) -> Self {
        Self {
            name: name.into(),
            status,
            diffs,
            children: Vec::new(),
        }
    }

    pub fn suite(name: impl Into<String>, status: TestStatus, children: Vec<TestNode>) -> Self {
        Self {
            name: name.into(),
            status,
            diffs: Vec::new(),
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// A node passes when it and every descendant passed or was ignored.
    pub fn is_passed(&self) -> bool {
        self.status.is_success() && self.children.iter().all(TestNode::is_passed)
    }

    /// Every observation attached to a leaf under this node, in tree order.
    pub fn collect_diffs(&self) -> Vec<DiffObservation> {
        let mut out = Vec::new();
        self.collect_diffs_into(&mut out);
        out
    }

    fn collect_diffs_into(&self, out: &mut Vec<DiffObservation>) {
        if self.is_leaf() {
            out.extend(self.diffs.iter().cloned());
        } else {
            for child in &self.children {
                child.collect_diffs_into(out);
            }
        }
    }

    /// Number of leaves that did not succeed.
    pub fn failed_leaves(&self) -> usize {
        if self.is_leaf() {
            usize::from(!self.status.is_success())
        } else {
            self.children.iter().map(TestNode::failed_leaves).sum()
        }
    }
}

/// The report a test command leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub root: TestNode,
}

impl TestReport {
    /// Load a report from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ReportError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading test report");

        if !path.exists() {
            return Err(ReportError::NotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let report = Self::from_json(&contents).map_err(|detail| ReportError::ParseError {
            path: path.display().to_string(),
            detail,
        })?;

        debug!(
            failed = report.root.failed_leaves(),
            passed = report.is_passed(),
            "test report parsed"
        );
        Ok(report)
    }

    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }

    pub fn is_passed(&self) -> bool {
        self.root.is_passed()
    }

    pub fn diffs(&self) -> Vec<DiffObservation> {
        self.root.collect_diffs()
    }
}
