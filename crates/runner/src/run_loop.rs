//! The run / apply / prompt loop.
//!
//! ```text
//! loop:
//!     run tests and wait for the report
//!     stop if the report passed
//!     apply the report's diffs
//!     unless the apply succeeded, ask the user before going round again
//! ```
//!
//! Waiting for a run and waiting for the user are the only suspension
//! points. Both give up as soon as shutdown is requested, and the apply in
//! between is synchronous, so a cancelled loop never leaves a partial
//! apply behind.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use goldmerge_core::aggregator::{Aggregator, ApplyOutcome};
use goldmerge_core::store::{FileStore, UndoJournal};

use crate::prompt::{message_for, Acknowledger};
use crate::signals::Shutdown;
use crate::test_runner::TestRunner;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The test run passed.
    Passed,
    /// The user chose not to continue after a prompt.
    Declined,
    /// `max_iterations` runs completed without a pass.
    IterationLimit,
    /// Shutdown was requested, or a run exceeded its timeout.
    Cancelled,
}

impl std::fmt::Display for LoopExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "tests passed"),
            Self::Declined => write!(f, "stopped at prompt"),
            Self::IterationLimit => write!(f, "iteration limit reached"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Aggregate statistics across iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u32,
    pub applies: u32,
    pub files_written: usize,
    pub conflicts: usize,
}

/// Progress notifications, for front ends that display them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    RunStarted { iteration: u32 },
    RunFinished { iteration: u32, passed: bool },
    Applied { iteration: u32, outcome: ApplyOutcome, written: usize },
    AwaitingAcknowledgement { message: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    pub max_iterations: u32,
    /// Give up on a run after this long. `None` waits indefinitely.
    pub run_timeout: Option<Duration>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            run_timeout: None,
        }
    }
}

/// Drives tests to green by repeatedly applying their diffs.
pub struct ApplyLoop<'a, S: FileStore + ?Sized> {
    aggregator: &'a Aggregator,
    store: &'a S,
    journal: Option<&'a UndoJournal>,
    options: LoopOptions,
    events: Option<broadcast::Sender<LoopEvent>>,
}

impl<'a, S: FileStore + ?Sized> ApplyLoop<'a, S> {
    pub fn new(aggregator: &'a Aggregator, store: &'a S, options: LoopOptions) -> Self {
        Self {
            aggregator,
            store,
            journal: None,
            options,
            events: None,
        }
    }

    /// Record every apply in `journal` so it can be undone.
    pub fn with_journal(mut self, journal: &'a UndoJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Publish progress on `events`.
    pub fn with_events(mut self, events: broadcast::Sender<LoopEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }

    /// Run until the tests pass, the user declines, the iteration limit is
    /// hit, or shutdown is requested.
    pub async fn run<R, A>(
        &self,
        runner: &mut R,
        acknowledger: &A,
        mut shutdown: Shutdown,
    ) -> Result<(LoopExit, LoopStats)>
    where
        R: TestRunner,
        A: Acknowledger,
    {
        let mut stats = LoopStats::default();
        info!(
            max_iterations = self.options.max_iterations,
            timeout_secs = self.options.run_timeout.map(|d| d.as_secs()),
            "apply loop started"
        );

        for iteration in 1..=self.options.max_iterations {
            if shutdown.is_requested() {
                return Ok((LoopExit::Cancelled, stats));
            }
            stats.iterations = iteration;

            // -- run ----------------------------------------------------------
            self.emit(LoopEvent::RunStarted { iteration });
            let mut handle = runner.start().context("failed to start test run")?;
            let timeout = self.options.run_timeout;
            let report = tokio::select! {
                result = handle.finished() => result?,
                _ = shutdown.requested() => {
                    info!(iteration, "shutdown requested while tests were running");
                    return Ok((LoopExit::Cancelled, stats));
                }
                _ = sleep_or_pending(timeout) => {
                    warn!(iteration, "test run timed out");
                    return Ok((LoopExit::Cancelled, stats));
                }
            };
            drop(handle);

            let passed = report.is_passed();
            self.emit(LoopEvent::RunFinished { iteration, passed });
            if passed {
                info!(iteration, "tests passed");
                return Ok((LoopExit::Passed, stats));
            }

            // -- apply --------------------------------------------------------
            let applied = self
                .aggregator
                .apply(self.store, &report.diffs(), false)
                .context("failed to apply diffs")?;
            stats.applies += 1;
            stats.files_written += applied.written();
            stats.conflicts += applied.conflicts();
            if let (Some(journal), Some(record)) = (self.journal, applied.record.clone()) {
                journal.append(record).context("failed to record apply")?;
            }
            self.emit(LoopEvent::Applied {
                iteration,
                outcome: applied.outcome,
                written: applied.written(),
            });
            info!(
                iteration,
                outcome = %applied.outcome,
                written = applied.written(),
                failed = report.root.failed_leaves(),
                "iteration complete"
            );

            // -- prompt -------------------------------------------------------
            let Some(message) = message_for(applied.outcome) else {
                continue;
            };
            self.emit(LoopEvent::AwaitingAcknowledgement { message });
            let proceed = tokio::select! {
                proceed = acknowledger.acknowledge(message) => proceed,
                _ = shutdown.requested() => {
                    info!(iteration, "shutdown requested while waiting for confirmation");
                    return Ok((LoopExit::Cancelled, stats));
                }
            };
            if !proceed {
                info!(iteration, "user declined to continue");
                return Ok((LoopExit::Declined, stats));
            }
        }

        warn!(
            iterations = stats.iterations,
            "iteration limit reached without a passing run"
        );
        Ok((LoopExit::IterationLimit, stats))
    }
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
