//! Shared styling utilities for CLI output.

use console::Style;

use goldmerge_core::aggregator::{ApplyOutcome, FileApplyStatus};

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Colored label for a per-file apply status.
pub fn file_status(status: &FileApplyStatus) -> String {
    let style = match status {
        FileApplyStatus::Written => Style::new().green(),
        FileApplyStatus::Unchanged => Style::new().dim(),
        FileApplyStatus::Missing => Style::new().yellow(),
        FileApplyStatus::Unreadable { .. } => Style::new().red(),
        FileApplyStatus::Ignored { .. } => Style::new().yellow(),
    };
    style.apply_to(status.label()).to_string()
}

/// One-line summary of an apply outcome.
pub fn outcome(outcome: ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Success => success("Diffs applied"),
        ApplyOutcome::HasConflict => error("Applying diffs produced a conflict"),
        ApplyOutcome::NoDiffs => warn("No diffs to apply"),
    }
}
