//! `goldmerge apply`, `goldmerge merge`, `goldmerge directive` and
//! `goldmerge undo`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use goldmerge_core::aggregator::{Aggregator, ApplyOutcome, ApplyReport, FileApplyResult, FileApplyStatus};
use goldmerge_core::config::AppConfig;
use goldmerge_core::directive::DirectiveEdit;
use goldmerge_core::merge::Merger;
use goldmerge_core::models::TestReport;
use goldmerge_core::path_policy::PathPolicy;
use goldmerge_core::store::{DiskStore, UndoJournal};

use crate::style;

/// Exit code for an apply outcome: 0 success, 1 conflict, 2 nothing to apply.
pub fn exit_code(outcome: ApplyOutcome) -> ExitCode {
    match outcome {
        ApplyOutcome::Success => ExitCode::SUCCESS,
        ApplyOutcome::HasConflict => ExitCode::from(1),
        ApplyOutcome::NoDiffs => ExitCode::from(2),
    }
}

/// Apply the diffs of one report.
pub fn run_apply(config: &AppConfig, report: Option<PathBuf>, dry_run: bool) -> Result<ExitCode> {
    let report_path = report.unwrap_or_else(|| config.report_path());
    let report = TestReport::load(&report_path).context("failed to load test report")?;

    let store = DiskStore::new(&config.general.workspace);
    let applied = Aggregator::from_config(config)
        .apply(&store, &report.diffs(), dry_run)
        .context("failed to apply diffs")?;

    if let Some(record) = applied.record.clone() {
        UndoJournal::new(config.state_dir())
            .append(record)
            .context("failed to record apply in undo journal")?;
    }

    print_report(&applied, dry_run);
    Ok(exit_code(applied.outcome))
}

pub fn print_report(applied: &ApplyReport, dry_run: bool) {
    println!();
    if !applied.files.is_empty() {
        print_files(&applied.files);
    }

    println!("{}", style::outcome(applied.outcome));
    print_footer(dry_run, applied.written());
}

fn print_files(files: &[FileApplyResult]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["File", "Status", "Observations", "Conflict", "EOL"]);

    for f in files {
        let status = match &f.status {
            FileApplyStatus::Ignored { reason } | FileApplyStatus::Unreadable { reason } => {
                format!("{} ({})", style::file_status(&f.status), reason)
            }
            other => style::file_status(other),
        };
        table.add_row(vec![
            Cell::new(&f.file_path),
            Cell::new(status),
            Cell::new(f.observations),
            Cell::new(if f.has_conflict { "yes" } else { "" }),
            Cell::new(f.separator.map(|s| s.to_string()).unwrap_or_default()),
        ]);
    }
    println!("{}", table);
    println!();
}

fn print_footer(dry_run: bool, written: usize) {
    if dry_run {
        println!("{}", style::dim("Dry run: no files were modified."));
    } else if written > 0 {
        println!("  {} file(s) written", written);
        println!("{}", style::dim("Revert with: goldmerge undo"));
    }
    println!();
}

/// Merge three files and print or write the result.
pub fn run_merge(
    config: &AppConfig,
    left: &Path,
    base: &Path,
    right: &Path,
    no_resolver: bool,
    output: Option<PathBuf>,
) -> Result<ExitCode> {
    let read = |p: &Path| {
        std::fs::read_to_string(p).with_context(|| format!("failed to read {}", p.display()))
    };
    let (left, base, right) = (read(left)?, read(base)?, read(right)?);

    let merger = if no_resolver {
        Merger::without_resolver()
    } else {
        Merger::new(config.merge.resolver.build())
    };
    let merged = merger.three_way_merge(&left, &base, &right);

    match output {
        Some(path) => {
            std::fs::write(&path, &merged.text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{}", style::success(&format!("Merged into {}", path.display())));
        }
        None => print!("{}", merged.text),
    }

    if merged.has_conflicts() {
        for region in &merged.conflicts {
            eprintln!(
                "{}",
                style::error(&format!(
                    "conflict at lines {}-{}",
                    region.start_line, region.end_line
                ))
            );
        }
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

/// Add or remove a directive line in the files a report selects.
pub fn run_directive(
    config: &AppConfig,
    edit: DirectiveEdit,
    report: Option<PathBuf>,
    dry_run: bool,
) -> Result<ExitCode> {
    let line = edit.line();
    if line.trim().is_empty() || line.contains(['\n', '\r']) {
        anyhow::bail!("directive must be a single non-empty line");
    }

    let report_path = report.unwrap_or_else(|| config.report_path());
    let report = TestReport::load(&report_path).context("failed to load test report")?;

    let store = DiskStore::new(&config.general.workspace);
    let edited = edit
        .with_policy(PathPolicy::from(&config.paths))
        .apply(&store, &report.diffs(), dry_run)
        .context("failed to edit files")?;

    if let Some(record) = edited.record.clone() {
        UndoJournal::new(config.state_dir())
            .append(record)
            .context("failed to record edit in undo journal")?;
    }

    println!();
    if edited.files.is_empty() {
        println!("{}", style::warn(&format!("No file selected for {} '{}'", edited.action, edited.line)));
        println!();
        return Ok(ExitCode::from(2));
    }

    print_files(&edited.files);
    println!(
        "{}",
        style::success(&format!(
            "{} '{}': {} file(s) changed",
            edited.action,
            edited.line,
            edited.written()
        ))
    );
    print_footer(dry_run, edited.written());
    Ok(ExitCode::SUCCESS)
}

/// Revert the newest apply.
pub fn run_undo(config: &AppConfig, force: bool) -> Result<ExitCode> {
    let journal = UndoJournal::new(config.state_dir());
    let store = DiskStore::new(&config.general.workspace);

    let record = journal.undo(&store, force).context("undo failed")?;

    println!();
    println!(
        "{}",
        style::success(&format!(
            "Reverted apply from {}",
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    );
    for file in &record.files {
        println!("  {}", file.path);
    }
    println!();
    Ok(ExitCode::SUCCESS)
}
