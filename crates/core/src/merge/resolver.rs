//! Fine-grained resolution of conflicting fragments.
//!
//! When both sides changed the same lines differently, the merge engine
//! asks a [`StructuralResolver`] for a second opinion before writing
//! conflict markers. [`TokenResolver`] re-runs the three-way merge at token
//! granularity, so edits to different words of the same line still merge.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::align::{segments, Segment};
use super::merger::trivial_resolution;

/// Strategy for resolving a conflicting fragment below line granularity.
pub trait StructuralResolver: Send + Sync {
    /// Return the merged text of three conflicting chunks, or `None` when
    /// they cannot be reconciled. Chunks are lines joined with `\n`.
    fn try_resolve(&self, left: &str, base: &str, right: &str) -> Option<String>;
}

/// Resolver that never resolves anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl StructuralResolver for NoResolver {
    fn try_resolve(&self, _left: &str, _base: &str, _right: &str) -> Option<String> {
        None
    }
}

/// Greedy token-level resolver.
///
/// Splits each chunk into words, horizontal whitespace runs, single
/// punctuation characters, and line breaks, aligns the token streams, and
/// succeeds only if every token fragment is one-sided or identical on both
/// sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenResolver;

impl StructuralResolver for TokenResolver {
    fn try_resolve(&self, left: &str, base: &str, right: &str) -> Option<String> {
        let left = tokenize(left);
        let base = tokenize(base);
        let right = tokenize(right);

        let mut merged = String::new();
        for segment in segments(&left, &base, &right) {
            let tokens = match segment {
                Segment::Unchanged(run) => run,
                Segment::Changed { left, base, right } => trivial_resolution(left, base, right)?,
            };
            for token in tokens {
                // Line breaks travel through the alignment as empty tokens.
                merged.push_str(if token.is_empty() { "\n" } else { token });
            }
        }
        Some(merged)
    }
}

/// Which resolver the merge engine consults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    #[default]
    Token,
    None,
}

impl ResolverKind {
    pub fn build(self) -> Box<dyn StructuralResolver> {
        match self {
            Self::Token => Box::new(TokenResolver),
            Self::None => Box::new(NoResolver),
        }
    }
}

impl std::fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::None => write!(f, "none"),
        }
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+|[ \t]+|\n|.").expect("token pattern is valid"))
}

/// Split text into tokens. A line break becomes the empty token, which no
/// other token can be, so tokens never contain `\n`.
fn tokenize(text: &str) -> Vec<&str> {
    token_pattern()
        .find_iter(text)
        .map(|m| if m.as_str() == "\n" { "" } else { m.as_str() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_resolver_never_resolves() {
        assert_eq!(NoResolver.try_resolve("a", "b", "c"), None);
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("fun foo(x: Int)"), vec!["fun", " ", "foo", "(", "x", ":", " ", "Int", ")"]);
        assert_eq!(tokenize("a\nb"), vec!["a", "", "b"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_different_words_of_one_line_merge() {
        let base = "val a = foo(1)";
        let left = "val b = foo(1)";
        let right = "val a = foo(2)";
        assert_eq!(
            TokenResolver.try_resolve(left, base, right).as_deref(),
            Some("val b = foo(2)")
        );
    }

    #[test]
    fn test_same_word_changed_differently_fails() {
        assert_eq!(TokenResolver.try_resolve("X", "B", "Y"), None);
        assert_eq!(TokenResolver.try_resolve("call(x)", "call(a)", "call(y)"), None);
    }

    #[test]
    fn test_multi_line_chunks() {
        let base = "first line\nsecond line";
        let left = "FIRST line\nsecond line";
        let right = "first line\nsecond LINE";
        assert_eq!(
            TokenResolver.try_resolve(left, base, right).as_deref(),
            Some("FIRST line\nsecond LINE")
        );
    }

    #[test]
    fn test_resolver_kind_build() {
        assert_eq!(ResolverKind::None.build().try_resolve("x a", "a", "a y"), None);
        assert_eq!(
            ResolverKind::Token.build().try_resolve("x a", "a", "a y").as_deref(),
            Some("x a y")
        );
    }
}
