//! kiln-types: pure data types for kiln.
//!
//! Everything here is plain data that crosses the boundary between the build
//! engine and its consumers (loggers, CLIs, test harnesses):
//!
//! - **Diagnostics**: [`Diagnostic`] and its [`Severity`]
//! - **Commit summaries**: what a VFS commit actually touched on disk
//! - **Build results**: the public outcome of one build generation
//!
//! No I/O and no async here. The kernel crate owns behavior.

mod commit;
mod diagnostic;
mod result;

pub use commit::{CommitFailure, CommitOp, CommitSummary};
pub use diagnostic::{has_error, Diagnostic, Severity};
pub use result::{BuildResult, BuildStats};
