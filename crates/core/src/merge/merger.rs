//! Three-way merge engine.
//!
//! Merges two competing edits (`left`, `right`) of a common ancestor
//! (`base`) line by line. Fragments that only one side touched, or that
//! both sides changed identically, resolve automatically. Anything else is
//! offered to a [`StructuralResolver`] and, failing that, written out
//! between conflict markers:
//!
//! ```text
//! <<<<<<< LEFT
//! ...left chunk lines...
//! =======
//! ...right chunk lines...
//! >>>>>>> RIGHT
//! ```

use std::borrow::Cow;

use tracing::debug;

use super::align::{segments, Segment};
use super::resolver::{NoResolver, StructuralResolver, TokenResolver};
use crate::text::{join_lines, normalize, split_lines};

pub const LEFT_MARKER: &str = "<<<<<<< LEFT";
pub const SEPARATOR_MARKER: &str = "=======";
pub const RIGHT_MARKER: &str = ">>>>>>> RIGHT";

/// The result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    /// The merged content (contains conflict markers if `conflicts` is non-empty).
    pub text: String,
    /// Location of every conflict marker block within `text`.
    pub conflicts: Vec<ConflictRegion>,
}

impl MergeOutput {
    fn clean(text: String) -> Self {
        Self {
            text,
            conflicts: Vec::new(),
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// A single conflict block within merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRegion {
    /// Line number (1-indexed) of the `<<<<<<< LEFT` marker.
    pub start_line: usize,
    /// Line number (1-indexed) of the `>>>>>>> RIGHT` marker.
    pub end_line: usize,
}

/// Stateless three-way merge engine with a pluggable structural resolver.
pub struct Merger {
    resolver: Box<dyn StructuralResolver>,
}

impl Merger {
    pub fn new(resolver: Box<dyn StructuralResolver>) -> Self {
        Self { resolver }
    }

    /// A merger that writes conflict markers for every disagreeing fragment.
    pub fn without_resolver() -> Self {
        Self::new(Box::new(NoResolver))
    }

    /// Merge `left` and `right` against their common ancestor `base`.
    ///
    /// Inputs are normalized to `\n` line endings first; the output always
    /// uses `\n`. Never fails: unresolvable fragments become conflict blocks.
    pub fn three_way_merge(&self, left: &str, base: &str, right: &str) -> MergeOutput {
        let left = normalize(left);
        let base = normalize(base);
        let right = normalize(right);

        if left == right {
            debug!("left == right, identical changes");
            return MergeOutput::clean(left);
        }
        if left == base {
            debug!("left == base, right wins cleanly");
            return MergeOutput::clean(right);
        }
        if right == base {
            debug!("right == base, left wins cleanly");
            return MergeOutput::clean(left);
        }

        let left_lines = split_lines(&left);
        let base_lines = split_lines(&base);
        let right_lines = split_lines(&right);

        let mut output: Vec<Cow<'_, str>> = Vec::with_capacity(base_lines.len());
        let mut conflicts = Vec::new();

        for segment in segments(&left_lines, &base_lines, &right_lines) {
            let (left_chunk, base_chunk, right_chunk) = match segment {
                Segment::Unchanged(run) => {
                    output.extend(run.iter().map(|l| Cow::Borrowed(*l)));
                    continue;
                }
                Segment::Changed { left, base, right } => (left, base, right),
            };

            if let Some(chunk) = trivial_resolution(left_chunk, base_chunk, right_chunk) {
                output.extend(chunk.iter().map(|l| Cow::Borrowed(*l)));
                continue;
            }

            if let Some(resolved) = self.try_structural(left_chunk, base_chunk, right_chunk) {
                debug!(lines = left_chunk.len(), "fragment resolved below line level");
                output.extend(resolved.split('\n').map(|l| Cow::Owned(l.to_string())));
                continue;
            }

            let start_line = output.len() + 1;
            output.push(Cow::Borrowed(LEFT_MARKER));
            output.extend(left_chunk.iter().map(|l| Cow::Borrowed(*l)));
            output.push(Cow::Borrowed(SEPARATOR_MARKER));
            output.extend(right_chunk.iter().map(|l| Cow::Borrowed(*l)));
            output.push(Cow::Borrowed(RIGHT_MARKER));
            conflicts.push(ConflictRegion {
                start_line,
                end_line: output.len(),
            });
        }

        debug!(conflicts = conflicts.len(), "three-way merge complete");
        MergeOutput {
            text: join_lines(&output),
            conflicts,
        }
    }

    /// Quick check: would merging these three versions leave no conflicts?
    pub fn can_auto_merge(&self, left: &str, base: &str, right: &str) -> bool {
        !self.three_way_merge(left, base, right).has_conflicts()
    }

    fn try_structural(&self, left: &[&str], base: &[&str], right: &[&str]) -> Option<String> {
        // An empty chunk and a single empty line join to the same text, so
        // a pure insertion or deletion is never handed to the resolver.
        if left.is_empty() || base.is_empty() || right.is_empty() {
            return None;
        }
        self.resolver
            .try_resolve(&join_lines(left), &join_lines(base), &join_lines(right))
    }
}

impl Default for Merger {
    fn default() -> Self {
        Self::new(Box::new(TokenResolver))
    }
}

/// Resolve a fragment without outside help: identical edits, or an edit on
/// one side only. `None` means both sides disagree.
pub(crate) fn trivial_resolution<'s, 'a>(
    left: &'s [&'a str],
    base: &'s [&'a str],
    right: &'s [&'a str],
) -> Option<&'s [&'a str]> {
    if left == right {
        Some(left)
    } else if left == base {
        Some(right)
    } else if right == base {
        Some(left)
    } else {
        None
    }
}
