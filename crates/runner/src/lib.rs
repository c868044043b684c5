//! goldmerge test loop.
//!
//! Runs the test suite, applies the diffs it reports, and asks the user to
//! step in whenever an apply leaves conflicts or there was nothing to apply.

pub mod prompt;
pub mod run_loop;
pub mod signals;
pub mod test_runner;

pub use prompt::{Acknowledger, AutoContinue, TerminalPrompt};
pub use run_loop::{ApplyLoop, LoopEvent, LoopExit, LoopOptions, LoopStats};
pub use signals::{setup_signal_handlers, Shutdown};
pub use test_runner::{CommandRunner, RunHandle, TestRunner};
