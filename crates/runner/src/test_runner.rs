//! Starting test runs and waiting for their results.
//!
//! Each run gets its own `oneshot` channel. The [`RunHandle`] owns the
//! receiving end; dropping it releases the subscription and aborts the task
//! driving the run, which kills the test process.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use goldmerge_core::config::AppConfig;
use goldmerge_core::models::TestReport;

/// Something that can run the test suite.
pub trait TestRunner {
    /// Start a run. The report arrives through the returned handle.
    fn start(&mut self) -> Result<RunHandle>;
}

/// A pending test run.
pub struct RunHandle {
    rx: oneshot::Receiver<Result<TestReport>>,
    task: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// A handle fed by the returned sender, with no task attached.
    pub fn channel() -> (oneshot::Sender<Result<TestReport>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx, task: None })
    }

    /// A handle whose run is driven by `task`. The task is aborted when the
    /// handle is dropped.
    pub fn with_task(rx: oneshot::Receiver<Result<TestReport>>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Wait for the run to finish.
    pub async fn finished(&mut self) -> Result<TestReport> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("test run ended without reporting a result")),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!("abandoning test run");
                task.abort();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shell command runner
// ---------------------------------------------------------------------------

/// Runs the configured test command through a shell and reads the report
/// it leaves behind.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: String,
    command: String,
    workdir: PathBuf,
    report: PathBuf,
}

impl CommandRunner {
    pub fn new(
        shell: impl Into<String>,
        command: impl Into<String>,
        workdir: impl Into<PathBuf>,
        report: impl Into<PathBuf>,
    ) -> Self {
        Self {
            shell: shell.into(),
            command: command.into(),
            workdir: workdir.into(),
            report: report.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.runner.shell.clone(),
            config.runner.command.clone(),
            config.general.workspace.clone(),
            config.report_path(),
        )
    }

    async fn execute(self) -> Result<TestReport> {
        // A report left over from an earlier run must not be mistaken for
        // this one.
        match tokio::fs::remove_file(&self.report).await {
            Ok(()) => debug!(path = %self.report.display(), "removed stale report"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to remove stale report {}", self.report.display())
                })
            }
        }

        info!(command = %self.command, workdir = %self.workdir.display(), "running tests");
        let status = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to spawn '{} -c {}'", self.shell, self.command))?;

        debug!(status = %status, "test command exited");
        if !self.report.exists() {
            return Err(anyhow!(
                "test command exited with {} and wrote no report at {}",
                status,
                self.report.display()
            ));
        }
        if !status.success() {
            // Failing tests usually mean a non-zero exit; the report decides.
            warn!(status = %status, "test command reported failure");
        }

        TestReport::load(&self.report).context("failed to load test report")
    }
}

impl TestRunner for CommandRunner {
    fn start(&mut self) -> Result<RunHandle> {
        let (tx, rx) = oneshot::channel();
        let run = self.clone();
        let task = tokio::spawn(async move {
            let result = run.execute().await;
            // The receiver is gone if the run was abandoned.
            let _ = tx.send(result);
        });
        Ok(RunHandle::with_task(rx, task))
    }
}
