//! Turning a finished [`BuildContext`] into a [`BuildResult`].

use std::collections::HashSet;
use std::path::PathBuf;

use kiln_types::{has_error, BuildResult, BuildStats, Diagnostic};

use super::context::BuildContext;
use crate::config::BuildConfig;

/// Drop repeated diagnostics, keeping the first occurrence of each.
pub fn clean_diagnostics(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    diagnostics
        .into_iter()
        .filter(|d| seen.insert(d.clone()))
        .collect()
}

fn sorted(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = paths.to_vec();
    paths.sort();
    paths
}

/// Assemble the public result for a generation.
///
/// Statistics are attached only when `config.build_stats` is set.
pub fn generate_build_results(config: &BuildConfig, ctx: &BuildContext, is_rebuild: bool) -> BuildResult {
    let stats = config.build_stats.then(|| BuildStats {
        duration_ms: u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX),
        is_rebuild,
        components: ctx.components.clone(),
        transpile_build_count: ctx.transpile_build_count,
        bundle_build_count: ctx.bundle_build_count,
        style_build_count: ctx.style_build_count,
        has_changed_js_text: ctx.has_changed_js_text,
        files_written: sorted(&ctx.files_written),
        files_changed: sorted(&ctx.changes.files_changed),
        files_updated: sorted(&ctx.changes.files_updated),
        files_added: sorted(&ctx.changes.files_added),
        files_deleted: sorted(&ctx.changes.files_deleted),
        dirs_added: sorted(&ctx.changes.dirs_added),
        dirs_deleted: sorted(&ctx.changes.dirs_deleted),
    });

    BuildResult {
        build_id: ctx.build_id,
        diagnostics: ctx.diagnostics.clone(),
        has_error: has_error(&ctx.diagnostics),
        aborted: ctx.is_aborted(),
        stats,
    }
}
