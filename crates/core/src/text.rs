//! Line-separator detection and conversion.
//!
//! All comparison and merging happens on text normalized to `\n`. The
//! original separator of a file is detected before an apply and restored
//! when the merged text is written back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A line-separator convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSeparator {
    #[default]
    Lf,
    CrLf,
    Cr,
}

impl LineSeparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }

    /// Detect the separator used by `text`, based on the first line break.
    ///
    /// Returns `None` for single-line text.
    pub fn detect(text: &str) -> Option<Self> {
        let idx = text.find(|c: char| c == '\n' || c == '\r')?;
        let bytes = text.as_bytes();
        if bytes[idx] == b'\n' {
            return Some(Self::Lf);
        }
        if bytes.get(idx + 1) == Some(&b'\n') {
            Some(Self::CrLf)
        } else {
            Some(Self::Cr)
        }
    }

    /// Like [`detect`](Self::detect), falling back to `\n`.
    pub fn detect_or_default(text: &str) -> Self {
        Self::detect(text).unwrap_or_default()
    }
}

impl fmt::Display for LineSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lf => write!(f, "LF"),
            Self::CrLf => write!(f, "CRLF"),
            Self::Cr => write!(f, "CR"),
        }
    }
}

/// Convert `\r\n` and lone `\r` to `\n`.
pub fn normalize(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Normalize `text`, then re-emit every line break as `sep`.
pub fn convert(text: &str, sep: LineSeparator) -> String {
    let normalized = normalize(text);
    match sep {
        LineSeparator::Lf => normalized,
        other => normalized.replace('\n', other.as_str()),
    }
}

/// Split normalized text into lines.
///
/// Every `\n` separates two lines, so `""` is one empty line and a trailing
/// `\n` produces a trailing empty line. [`join_lines`] is the exact inverse.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Join lines with `\n`.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(LineSeparator::detect("a\nb"), Some(LineSeparator::Lf));
        assert_eq!(LineSeparator::detect("a\r\nb\nc"), Some(LineSeparator::CrLf));
        assert_eq!(LineSeparator::detect("a\rb"), Some(LineSeparator::Cr));
        assert_eq!(LineSeparator::detect("single line"), None);
        assert_eq!(LineSeparator::detect_or_default(""), LineSeparator::Lf);
    }

    #[test]
    fn test_detect_trailing_cr() {
        assert_eq!(LineSeparator::detect("abc\r"), Some(LineSeparator::Cr));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert_eq!(normalize("plain\n"), "plain\n");
    }

    #[test]
    fn test_convert() {
        assert_eq!(convert("a\nb\n", LineSeparator::CrLf), "a\r\nb\r\n");
        assert_eq!(convert("a\r\nb", LineSeparator::Lf), "a\nb");
        assert_eq!(convert("a\r\nb", LineSeparator::Cr), "a\rb");
    }

    #[test]
    fn test_split_join_inverse() {
        for text in ["", "a", "a\n", "\n\n", "a\nb\nc"] {
            assert_eq!(join_lines(&split_lines(text)), text);
        }
        assert_eq!(split_lines(""), vec![""]);
        assert_eq!(split_lines("a\n"), vec!["a", ""]);
    }
}
