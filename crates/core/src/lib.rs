//! goldmerge core library.
//!
//! Reconciles expected-vs-actual comparisons from golden-file tests back
//! into the files on disk: test-report model, diff aggregation, three-way
//! merging, directive-line edits, path policy, transactional file store
//! with undo, and configuration.

pub mod aggregator;
pub mod config;
pub mod directive;
pub mod errors;
pub mod merge;
pub mod models;
pub mod path_policy;
pub mod store;
pub mod text;

// Re-exports for convenience.
pub use aggregator::{Aggregator, ApplyOutcome, ApplyReport, FileApplyStatus};
pub use config::AppConfig;
pub use directive::{DirectiveAction, DirectiveEdit, DirectiveReport};
pub use merge::{MergeOutput, Merger};
pub use models::{DiffObservation, TestReport};
pub use store::{DiskStore, FileStore, MemoryStore, UndoJournal};
