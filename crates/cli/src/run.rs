//! `goldmerge run`: the test / apply / prompt loop.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;

use goldmerge_core::aggregator::Aggregator;
use goldmerge_core::config::AppConfig;
use goldmerge_core::store::{DiskStore, UndoJournal};
use goldmerge_runner::{
    setup_signal_handlers, ApplyLoop, AutoContinue, CommandRunner, LoopEvent, LoopExit,
    LoopOptions, TerminalPrompt,
};

use crate::style;

pub async fn run_loop(config: &AppConfig, max_iterations: Option<u32>, yes: bool) -> Result<ExitCode> {
    let mut config = config.clone();
    if let Some(n) = max_iterations {
        config.runner.max_iterations = n;
    }
    config
        .validate_for_loop()
        .context("configuration is not usable for the test loop")?;

    let aggregator = Aggregator::from_config(&config);
    let store = DiskStore::new(&config.general.workspace);
    let journal = UndoJournal::new(config.state_dir());
    let mut runner = CommandRunner::from_config(&config);
    let options = LoopOptions {
        max_iterations: config.runner.max_iterations,
        run_timeout: (config.runner.timeout_secs > 0)
            .then(|| Duration::from_secs(config.runner.timeout_secs)),
    };

    println!();
    println!("{}", style::header("goldmerge run"));
    println!("  Command        : {}", config.runner.command);
    println!("  Report         : {}", config.report_path().display());
    println!("  Max iterations : {}", options.max_iterations);
    println!();

    let (events_tx, events_rx) = broadcast::channel(32);
    let progress = tokio::spawn(show_progress(events_rx));
    let shutdown = setup_signal_handlers();

    let driver = ApplyLoop::new(&aggregator, &store, options)
        .with_journal(&journal)
        .with_events(events_tx);
    let result = if yes {
        driver.run(&mut runner, &AutoContinue, shutdown).await
    } else {
        driver.run(&mut runner, &TerminalPrompt, shutdown).await
    };
    // Dropping the loop closes the event channel and ends the progress task.
    drop(driver);
    let _ = progress.await;

    let (exit, stats) = result?;
    println!();
    let summary = format!(
        "{} after {} iteration(s): {} apply(s), {} file(s) written, {} conflicted",
        exit, stats.iterations, stats.applies, stats.files_written, stats.conflicts
    );
    match exit {
        LoopExit::Passed => println!("{}", style::success(&summary)),
        LoopExit::Declined | LoopExit::IterationLimit => println!("{}", style::warn(&summary)),
        LoopExit::Cancelled => {
            println!("{}", style::error(&summary));
            // A pending terminal prompt would hold up runtime shutdown, and
            // exiting skips its cleanup.
            restore_terminal();
            std::process::exit(130);
        }
    }
    println!();

    Ok(match exit {
        LoopExit::Passed => ExitCode::SUCCESS,
        _ => ExitCode::from(1),
    })
}

/// Show the cursor a dismissed prompt may have hidden.
fn restore_terminal() {
    for term in [console::Term::stderr(), console::Term::stdout()] {
        if let Err(e) = term.show_cursor() {
            tracing::debug!(error = %e, "could not restore cursor");
        }
    }
}

async fn show_progress(mut events: broadcast::Receiver<LoopEvent>) {
    let mut spinner: Option<ProgressBar> = None;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            LoopEvent::RunStarted { iteration } => {
                let bar = ProgressBar::new_spinner();
                if let Ok(s) = ProgressStyle::with_template("{spinner:.blue} {msg} {elapsed}") {
                    bar.set_style(s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
                }
                bar.set_message(format!("Running tests (iteration {})...", iteration));
                bar.enable_steady_tick(Duration::from_millis(100));
                spinner = Some(bar);
            }
            LoopEvent::RunFinished { iteration, passed } => {
                if let Some(bar) = spinner.take() {
                    bar.finish_and_clear();
                }
                let msg = format!("Iteration {}: tests {}", iteration, if passed { "passed" } else { "failed" });
                if passed {
                    println!("{}", style::success(&msg));
                } else {
                    println!("{}", style::warn(&msg));
                }
            }
            LoopEvent::Applied { outcome, written, .. } => {
                println!("  {} ({} file(s) written)", style::outcome(outcome), written);
            }
            LoopEvent::AwaitingAcknowledgement { .. } => {}
        }
    }

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
}
