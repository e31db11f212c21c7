//! Build generations.
//!
//! - **BuildController**: hands out generation ids, decides full vs
//!   incremental builds, answers the cooperative abort poll
//! - **BuildContext**: what one generation accumulates
//! - **report**: freezes a context into a [`BuildResult`](kiln_types::BuildResult)
//! - **BuildEvent**: broadcast after each generation
//!
//! A typical generation:
//!
//! ```text
//! start_build ─▶ compile steps (poll should_abort) ─▶ commit ─▶ finish_build
//!                        │                                          │
//!                        └──── read/write through Vfs                └─▶ Build / Rebuild event
//! ```

mod context;
mod controller;
mod events;
pub mod report;

pub use context::{BuildContext, BuildStatus, WatcherResults};
pub use controller::BuildController;
pub use events::BuildEvent;
pub use report::{clean_diagnostics, generate_build_results};
