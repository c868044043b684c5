//! Three-way line alignment.
//!
//! Base is diffed against each side with `diffy`, and the two change lists
//! are combined into ordered, disjoint [`Fragment`]s. Lines between two
//! fragments are identical in left, base, and right.
//!
//! The alignment works on any sequence of `&str` items that do not contain
//! `\n`: text lines for the merge engine, tokens for the token resolver.

use std::ops::Range;

use diffy::{DiffOptions, Line};

/// A region where at least one side differs from base.
///
/// All ranges are half-open indices into the respective line sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub base: Range<usize>,
    pub left: Range<usize>,
    pub right: Range<usize>,
}

/// One step of a walk over an alignment: either a run shared by all three
/// inputs, or a fragment's three chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'s, 'a> {
    Unchanged(&'s [&'a str]),
    Changed {
        left: &'s [&'a str],
        base: &'s [&'a str],
        right: &'s [&'a str],
    },
}

/// A change between base and one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Change {
    base_start: usize,
    base_end: usize,
    side_start: usize,
    side_end: usize,
}

/// Compute the fragments of a three-way alignment, ordered by base position.
pub fn align(base: &[&str], left: &[&str], right: &[&str]) -> Vec<Fragment> {
    let left_changes = changes(base, left);
    let right_changes = changes(base, right);

    let mut fragments = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (mut left_delta, mut right_delta) = (0isize, 0isize);

    while i < left_changes.len() || j < right_changes.len() {
        let take_left = match (left_changes.get(i), right_changes.get(j)) {
            (Some(l), Some(r)) => l.base_start <= r.base_start,
            (Some(_), None) => true,
            _ => false,
        };
        let (left_from, right_from) = (i, j);
        let first = if take_left {
            i += 1;
            left_changes[i - 1]
        } else {
            j += 1;
            right_changes[j - 1]
        };
        let base_start = first.base_start;
        let mut base_end = first.base_end;

        // Absorb every change from either side that overlaps or touches the
        // region collected so far.
        loop {
            if let Some(c) = left_changes.get(i).filter(|c| c.base_start <= base_end) {
                base_end = base_end.max(c.base_end);
                i += 1;
            } else if let Some(c) = right_changes.get(j).filter(|c| c.base_start <= base_end) {
                base_end = base_end.max(c.base_end);
                j += 1;
            } else {
                break;
            }
        }

        let left_range = side_range(&left_changes[left_from..i], base_start, base_end, &mut left_delta);
        let right_range =
            side_range(&right_changes[right_from..j], base_start, base_end, &mut right_delta);

        fragments.push(Fragment {
            base: base_start..base_end,
            left: left_range,
            right: right_range,
        });
    }

    fragments
}

/// Walk the alignment of three sequences, yielding shared runs and
/// fragment chunks in order. Concatenating the base view of every segment
/// reproduces `base`.
pub fn segments<'s, 'a>(
    left: &'s [&'a str],
    base: &'s [&'a str],
    right: &'s [&'a str],
) -> Vec<Segment<'s, 'a>> {
    let mut out = Vec::new();
    let mut cursor = 0;

    for fragment in align(base, left, right) {
        if cursor < fragment.base.start {
            out.push(Segment::Unchanged(&base[cursor..fragment.base.start]));
        }
        out.push(Segment::Changed {
            left: &left[fragment.left.clone()],
            base: &base[fragment.base.clone()],
            right: &right[fragment.right.clone()],
        });
        cursor = fragment.base.end;
    }

    if cursor < base.len() {
        out.push(Segment::Unchanged(&base[cursor..]));
    }

    out
}

/// Map a combined base region onto one side.
///
/// `delta` is the side-minus-base line offset accumulated before the region
/// and is updated to the offset after it.
fn side_range(group: &[Change], base_start: usize, base_end: usize, delta: &mut isize) -> Range<usize> {
    let range = match (group.first(), group.last()) {
        (Some(first), Some(last)) => {
            let start = first.side_start - (first.base_start - base_start);
            let end = last.side_end + (base_end - last.base_end);
            start..end
        }
        _ => shift(base_start, *delta)..shift(base_end, *delta),
    };
    *delta = range.end as isize - base_end as isize;
    range
}

fn shift(pos: usize, delta: isize) -> usize {
    (pos as isize + delta) as usize
}

/// Line changes turning `base` into `side`, in base order.
fn changes(base: &[&str], side: &[&str]) -> Vec<Change> {
    if base == side {
        return Vec::new();
    }

    let original = terminated(base);
    let modified = terminated(side);

    // Context wide enough to fold the whole file into a single hunk, so the
    // walk below never has to reason about hunk offsets beyond the first.
    let mut options = DiffOptions::new();
    options.set_context_len(base.len() + side.len() + 1);
    let patch = options.create_patch(&original, &modified);

    let mut changes = Vec::new();
    for hunk in patch.hunks() {
        let mut b = hunk.old_range().start().saturating_sub(1);
        let mut s = hunk.new_range().start().saturating_sub(1);
        let mut open: Option<Change> = None;

        for line in hunk.lines() {
            match line {
                Line::Context(_) => {
                    if let Some(change) = open.take() {
                        changes.push(change);
                    }
                    b += 1;
                    s += 1;
                }
                Line::Delete(_) => {
                    open.get_or_insert(Change {
                        base_start: b,
                        base_end: b,
                        side_start: s,
                        side_end: s,
                    })
                    .base_end += 1;
                    b += 1;
                }
                Line::Insert(_) => {
                    open.get_or_insert(Change {
                        base_start: b,
                        base_end: b,
                        side_start: s,
                        side_end: s,
                    })
                    .side_end += 1;
                    s += 1;
                }
            }
        }

        if let Some(change) = open.take() {
            changes.push(change);
        }
    }

    changes
}

/// Render items as newline-terminated lines, the shape `diffy` diffs.
fn terminated(items: &[&str]) -> String {
    let mut out = String::with_capacity(items.iter().map(|s| s.len() + 1).sum());
    for item in items {
        out.push_str(item);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &str) -> Vec<&str> {
        s.split('\n').collect()
    }

    /// Fragments are ordered, disjoint, and every gap is identical on all
    /// three sides.
    fn assert_well_formed(base: &[&str], left: &[&str], right: &[&str]) {
        let fragments = align(base, left, right);
        let (mut b, mut l, mut r) = (0, 0, 0);
        for f in &fragments {
            assert!(f.base.start >= b, "fragments overlap: {fragments:?}");
            let gap = f.base.start - b;
            assert_eq!(f.left.start - l, gap);
            assert_eq!(f.right.start - r, gap);
            assert_eq!(&base[b..f.base.start], &left[l..f.left.start]);
            assert_eq!(&base[b..f.base.start], &right[r..f.right.start]);
            b = f.base.end;
            l = f.left.end;
            r = f.right.end;
        }
        assert_eq!(&base[b..], &left[l..]);
        assert_eq!(&base[b..], &right[r..]);
    }

    #[test]
    fn test_identical_inputs_have_no_fragments() {
        let base = lines("a\nb\nc");
        assert!(align(&base, &base, &base).is_empty());
    }

    #[test]
    fn test_single_side_change() {
        let base = lines("a\nb\nc");
        let right = lines("a\nY\nc");
        let fragments = align(&base, &base, &right);
        assert_eq!(
            fragments,
            vec![Fragment {
                base: 1..2,
                left: 1..2,
                right: 1..2,
            }]
        );
    }

    #[test]
    fn test_same_region_both_sides() {
        let base = lines("a\nb\nc");
        let left = lines("a\nX\nc");
        let right = lines("a\nY\nc");
        let fragments = align(&base, &left, &right);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].base, 1..2);
        assert_eq!(fragments[0].left, 1..2);
        assert_eq!(fragments[0].right, 1..2);
    }

    #[test]
    fn test_non_overlapping_changes_stay_separate() {
        let base = lines("a\nb\nc\nd\ne");
        let left = lines("A\nb\nc\nd\ne");
        let right = lines("a\nb\nc\nd\nE");
        let fragments = align(&base, &left, &right);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].base, 0..1);
        assert_eq!(fragments[1].base, 4..5);
        assert_well_formed(&base, &left, &right);
    }

    #[test]
    fn test_offsets_after_insertions() {
        let base = lines("a\nb\nc\nd");
        let left = lines("a\nnew1\nnew2\nb\nc\nd");
        let right = lines("a\nb\nc\nD");
        let fragments = align(&base, &left, &right);
        assert_eq!(fragments.len(), 2);
        // Left insertion before base line 1.
        assert_eq!(fragments[0].base, 1..1);
        assert_eq!(fragments[0].left, 1..3);
        assert_eq!(fragments[0].right, 1..1);
        // Right change of the last line, shifted by two on the left.
        assert_eq!(fragments[1].base, 3..4);
        assert_eq!(fragments[1].left, 5..6);
        assert_eq!(fragments[1].right, 3..4);
        assert_well_formed(&base, &left, &right);
    }

    #[test]
    fn test_overlapping_changes_are_combined() {
        let base = lines("a\nb\nc\nd\ne");
        let left = lines("a\nB\nC\nd\ne");
        let right = lines("a\nb\nC2\nD2\ne");
        let fragments = align(&base, &left, &right);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].base, 1..4);
        assert_eq!(fragments[0].left, 1..4);
        assert_eq!(fragments[0].right, 1..4);
    }

    #[test]
    fn test_deletion_and_insertion() {
        let base = lines("a\nb\nc\nd");
        let left = lines("a\nd");
        let right = lines("a\nb\nc\nd\ne");
        assert_well_formed(&base, &left, &right);
        let fragments = align(&base, &left, &right);
        assert_eq!(fragments[0].base, 1..3);
        assert_eq!(fragments[0].left, 1..1);
    }

    #[test]
    fn test_segments_reconstruct_base() {
        let base = lines("1\n2\n3\n4\n5\n6");
        let left = lines("1\nX\n3\n4\n5\n6");
        let right = lines("1\n2\n3\n4\nY\n6\n7");
        let mut rebuilt: Vec<&str> = Vec::new();
        for segment in segments(&left, &base, &right) {
            match segment {
                Segment::Unchanged(run) => rebuilt.extend_from_slice(run),
                Segment::Changed { base, .. } => rebuilt.extend_from_slice(base),
            }
        }
        assert_eq!(rebuilt, base);
    }

    #[test]
    fn test_empty_texts() {
        let empty = lines("");
        let full = lines("a\nb");
        assert_well_formed(&empty, &full, &empty);
        assert_well_formed(&full, &empty, &full);
    }
}
