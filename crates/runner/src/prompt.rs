//! Asking the user whether the loop may continue.

use std::future::Future;

use dialoguer::Confirm;
use tracing::warn;

use goldmerge_core::aggregator::ApplyOutcome;

pub const CONFLICT_MESSAGE: &str =
    "Applying diffs produced a conflict. Resolve conflicts to continue.";
pub const NO_DIFFS_MESSAGE: &str =
    "Tests failed without a diff. Address test failures to continue.";

/// The prompt shown after an apply, or `None` when the loop continues on
/// its own.
pub fn message_for(outcome: ApplyOutcome) -> Option<&'static str> {
    match outcome {
        ApplyOutcome::Success => None,
        ApplyOutcome::HasConflict => Some(CONFLICT_MESSAGE),
        ApplyOutcome::NoDiffs => Some(NO_DIFFS_MESSAGE),
    }
}

/// Waits for the user to acknowledge a message. Resolves to `true` to
/// continue the loop, `false` to stop it.
pub trait Acknowledger {
    fn acknowledge(&self, message: &str) -> impl Future<Output = bool>;
}

/// Interactive yes/no prompt on the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Acknowledger for TerminalPrompt {
    fn acknowledge(&self, message: &str) -> impl Future<Output = bool> {
        let prompt = format!("{} Continue?", message);
        async move {
            let answer = tokio::task::spawn_blocking(move || {
                Confirm::new().with_prompt(prompt).default(true).interact()
            })
            .await;
            match answer {
                Ok(Ok(choice)) => choice,
                Ok(Err(e)) => {
                    warn!(error = %e, "failed to read confirmation, stopping");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "confirmation prompt panicked, stopping");
                    false
                }
            }
        }
    }
}

/// Continues without asking. For CI and other non-interactive use.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoContinue;

impl Acknowledger for AutoContinue {
    fn acknowledge(&self, message: &str) -> impl Future<Output = bool> {
        warn!(prompt = message, "continuing without confirmation");
        std::future::ready(true)
    }
}
