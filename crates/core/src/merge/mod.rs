//! Three-way merging of golden-file updates.
//!
//! 1. **Alignment** -- diffing base against both sides and grouping the
//!    changes into fragments.
//! 2. **Merging** -- resolving each fragment or emitting conflict markers.
//! 3. **Resolution** -- optional finer-grained reconciliation of fragments
//!    that disagree at line level.

pub mod align;
pub mod merger;
pub mod resolver;

pub use align::{align, Fragment};
pub use merger::{ConflictRegion, MergeOutput, Merger};
pub use resolver::{NoResolver, ResolverKind, StructuralResolver, TokenResolver};
