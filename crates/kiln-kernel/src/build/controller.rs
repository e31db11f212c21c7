//! Build generation control.
//!
//! Every build gets a generation id from a monotonic counter. A build that
//! has been overtaken by a newer generation, or that has produced an error,
//! must stop doing work: compile steps poll [`BuildController::should_abort`]
//! between phases. The poll never interrupts I/O already in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use kiln_types::{BuildResult, CommitSummary, Severity};
use tokio::sync::broadcast;

use super::context::{BuildContext, BuildStatus, WatcherResults};
use super::events::BuildEvent;
use super::report::{clean_diagnostics, generate_build_results};
use crate::config::BuildConfig;
use crate::vfs::{LocalFs, Vfs};

/// Long-lived owner of the compiler-wide build state.
///
/// One per process (or per test). Generation ids and the error flag are
/// atomics, so a stale generation can keep polling while a new one runs.
pub struct BuildController {
    config: BuildConfig,
    fs: Arc<Vfs>,
    active_build_id: AtomicU64,
    last_build_had_error: AtomicBool,
    is_rebuild: AtomicBool,
    events: broadcast::Sender<BuildEvent>,
}

impl std::fmt::Debug for BuildController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildController")
            .field("config", &self.config)
            .field("active_build_id", &self.active_build_id())
            .field("last_build_had_error", &self.last_build_had_error())
            .field("is_rebuild", &self.is_rebuild())
            .finish()
    }
}

impl BuildController {
    pub fn new(config: BuildConfig, fs: Arc<Vfs>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            fs,
            active_build_id: AtomicU64::new(0),
            last_build_had_error: AtomicBool::new(false),
            is_rebuild: AtomicBool::new(false),
            events,
        }
    }

    /// Controller over the real disk, rooted at `config.root_dir`.
    pub fn on_local_disk(config: BuildConfig) -> Self {
        let disk = Arc::new(LocalFs::new(config.root_dir.clone()));
        Self::new(config, Arc::new(Vfs::new(disk)))
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The overlay every generation reads and writes through.
    pub fn fs(&self) -> &Arc<Vfs> {
        &self.fs
    }

    /// Id of the newest generation started so far (0 before the first).
    pub fn active_build_id(&self) -> u64 {
        self.active_build_id.load(Ordering::SeqCst)
    }

    pub fn last_build_had_error(&self) -> bool {
        self.last_build_had_error.load(Ordering::SeqCst)
    }

    /// Whether the current generation was triggered by the watcher.
    pub fn is_rebuild(&self) -> bool {
        self.is_rebuild.load(Ordering::SeqCst)
    }

    /// Listen for [`BuildEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    /// Open a new build generation.
    ///
    /// `changes` is `None` for the initial build. A full build is required
    /// when there is no change set, when the config changed, or when the
    /// previous build failed; in the last case the overlay cache is dropped
    /// too, since it may hold state from a half-finished generation.
    pub fn start_build(&self, changes: Option<WatcherResults>) -> BuildContext {
        let is_rebuild = changes.is_some();
        self.is_rebuild.store(is_rebuild, Ordering::SeqCst);

        let config_updated = changes.as_ref().is_some_and(|c| c.config_updated);
        let after_error = self.last_build_had_error();
        let requires_full_build = !is_rebuild || config_updated || after_error;

        if after_error {
            tracing::debug!("previous build failed, clearing fs cache");
            self.fs.clear_cache();
        }

        let build_id = self.active_build_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            build_id,
            namespace = %self.config.fs_namespace,
            mode = self.config.mode(),
            full = requires_full_build,
            "{} started",
            if is_rebuild { "rebuild" } else { "build" }
        );

        BuildContext::new(build_id, requires_full_build, changes)
    }

    /// Cooperative abort check, to be called between compile phases.
    ///
    /// True when a newer generation has started or `ctx` already carries an
    /// error diagnostic. Either way `ctx` is marked aborted; an error also
    /// sets the compiler-wide error flag so the next build runs in full.
    pub fn should_abort(&self, ctx: &mut BuildContext) -> bool {
        if self.active_build_id() > ctx.build_id {
            tracing::debug!(
                build_id = ctx.build_id,
                active = self.active_build_id(),
                "build superseded"
            );
            ctx.status = BuildStatus::Aborted;
            return true;
        }

        if ctx.has_error() {
            self.last_build_had_error.store(true, Ordering::SeqCst);
            ctx.status = BuildStatus::Aborted;
            return true;
        }

        false
    }

    /// Flush the overlay to disk for this generation.
    ///
    /// Returns `None` without touching the disk if the build should abort.
    /// Commit failures are folded into `ctx` as error diagnostics.
    pub async fn commit(&self, ctx: &mut BuildContext) -> Option<CommitSummary> {
        if self.should_abort(ctx) {
            return None;
        }
        let summary = self.fs.commit().await;
        ctx.record_commit(&summary);
        Some(summary)
    }

    /// Freeze a generation into its public result, log it and notify
    /// subscribers.
    ///
    /// A generation that has been superseded is reported as aborted even if
    /// it never polled [`should_abort`](Self::should_abort). Only the active
    /// generation updates the error flag.
    pub fn finish_build(&self, mut ctx: BuildContext) -> BuildResult {
        ctx.diagnostics = clean_diagnostics(std::mem::take(&mut ctx.diagnostics));
        log_diagnostics(&ctx);

        // A superseded generation must not touch compiler-wide state.
        let is_active = self.active_build_id() == ctx.build_id;
        if !is_active {
            ctx.status = BuildStatus::Aborted;
        }

        let is_rebuild = ctx.is_rebuild;
        let build_text = if is_rebuild { "rebuild" } else { "build" };
        let elapsed_ms = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);

        if ctx.is_aborted() {
            tracing::info!(build_id = ctx.build_id, elapsed_ms, "{} aborted", build_text);
        } else {
            ctx.status = BuildStatus::Finished;
            let failed = ctx.has_error();
            if is_active {
                self.last_build_had_error.store(failed, Ordering::SeqCst);
            }

            let watch_text = if self.config.watch {
                ", watching for changes..."
            } else {
                ""
            };
            if failed {
                tracing::error!(build_id = ctx.build_id, elapsed_ms, "{} failed{}", build_text, watch_text);
            } else {
                tracing::info!(build_id = ctx.build_id, elapsed_ms, "{} finished{}", build_text, watch_text);
            }
        }

        let result = generate_build_results(&self.config, &ctx, is_rebuild);

        // no subscribers is fine
        let _ = self.events.send(BuildEvent::Build(result.clone()));
        if is_rebuild {
            let _ = self.events.send(BuildEvent::Rebuild(result.clone()));
        }

        result
    }
}

fn log_diagnostics(ctx: &BuildContext) {
    for d in &ctx.diagnostics {
        let file = d.file.as_ref().map(|f| f.display().to_string()).unwrap_or_default();
        match d.severity {
            Severity::Error => {
                tracing::error!(build_id = ctx.build_id, kind = %d.kind, file = %file, "{}: {}", d.header, d.message)
            }
            Severity::Warning => {
                tracing::warn!(build_id = ctx.build_id, kind = %d.kind, file = %file, "{}: {}", d.header, d.message)
            }
            Severity::Info => {
                tracing::info!(build_id = ctx.build_id, kind = %d.kind, file = %file, "{}: {}", d.header, d.message)
            }
            Severity::Debug => {
                tracing::debug!(build_id = ctx.build_id, kind = %d.kind, file = %file, "{}: {}", d.header, d.message)
            }
        }
    }
}
