//! Per-generation build state.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use kiln_types::{has_error, CommitSummary, Diagnostic};

/// Lifecycle of one build generation.
///
/// ```text
/// Pending ──start──▶ Running ──▶ Finished
///                       │
///                       └──────▶ Aborted (superseded or errored)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildStatus {
    #[default]
    Pending,
    Running,
    Finished,
    Aborted,
}

/// What the file watcher saw change since the previous build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherResults {
    pub files_changed: Vec<PathBuf>,
    pub files_updated: Vec<PathBuf>,
    pub files_added: Vec<PathBuf>,
    pub files_deleted: Vec<PathBuf>,
    pub dirs_added: Vec<PathBuf>,
    pub dirs_deleted: Vec<PathBuf>,
    /// The build configuration itself changed; forces a full build.
    pub config_updated: bool,
}

/// Everything one build generation accumulates.
///
/// Created by [`BuildController::start_build`](super::BuildController::start_build),
/// mutated by compile steps, frozen into a
/// [`BuildResult`](kiln_types::BuildResult) by
/// [`BuildController::finish_build`](super::BuildController::finish_build).
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub build_id: u64,
    /// Incremental caches cannot be trusted for this generation.
    pub requires_full_build: bool,
    pub is_rebuild: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub status: BuildStatus,
    pub start_time: Instant,
    pub changes: WatcherResults,

    pub components: Vec<String>,
    pub transpile_build_count: u32,
    pub bundle_build_count: u32,
    pub style_build_count: u32,
    pub app_file_build_count: u32,
    pub index_build_count: u32,
    pub has_changed_js_text: bool,

    /// Filled from commit summaries.
    pub files_written: Vec<PathBuf>,
    pub files_copied: Vec<PathBuf>,
    pub dirs_created: Vec<PathBuf>,
    pub dirs_removed: Vec<PathBuf>,
}

impl BuildContext {
    pub(crate) fn new(build_id: u64, requires_full_build: bool, changes: Option<WatcherResults>) -> Self {
        Self {
            build_id,
            requires_full_build,
            is_rebuild: changes.is_some(),
            diagnostics: Vec::new(),
            status: BuildStatus::Running,
            start_time: Instant::now(),
            changes: changes.unwrap_or_default(),
            components: Vec::new(),
            transpile_build_count: 0,
            bundle_build_count: 0,
            style_build_count: 0,
            app_file_build_count: 0,
            index_build_count: 0,
            has_changed_js_text: false,
            files_written: Vec::new(),
            files_copied: Vec::new(),
            dirs_created: Vec::new(),
            dirs_removed: Vec::new(),
        }
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_error(&self) -> bool {
        has_error(&self.diagnostics)
    }

    pub fn is_aborted(&self) -> bool {
        self.status == BuildStatus::Aborted
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Fold a commit summary into this generation.
    ///
    /// Every failed path becomes an error diagnostic of kind `fs`, so a
    /// partly failed commit fails the build.
    pub fn record_commit(&mut self, summary: &CommitSummary) {
        self.files_written.extend(summary.files_written.iter().cloned());
        self.files_copied.extend(summary.files_copied.iter().cloned());
        self.dirs_created.extend(summary.dirs_added.iter().cloned());
        self.dirs_removed.extend(summary.dirs_deleted.iter().cloned());

        for failure in &summary.failures {
            self.add_diagnostic(
                Diagnostic::error("fs", failure.message.clone())
                    .with_header(format!("failed to {}", failure.op))
                    .with_file(failure.path.clone(), None),
            );
        }
    }
}
