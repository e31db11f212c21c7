//! The public outcome of a build generation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::Diagnostic;

/// Result of one build generation, handed to loggers and event listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub build_id: u64,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub aborted: bool,
    /// Only present when build statistics are enabled in the config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BuildStats>,
}

/// Detailed statistics for a build, mostly useful for tests and debugging.
///
/// Every path list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub duration_ms: u64,
    pub is_rebuild: bool,
    pub components: Vec<String>,
    pub transpile_build_count: u32,
    pub bundle_build_count: u32,
    pub style_build_count: u32,
    pub has_changed_js_text: bool,
    pub files_written: Vec<PathBuf>,
    pub files_changed: Vec<PathBuf>,
    pub files_updated: Vec<PathBuf>,
    pub files_added: Vec<PathBuf>,
    pub files_deleted: Vec<PathBuf>,
    pub dirs_added: Vec<PathBuf>,
    pub dirs_deleted: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_are_omitted_when_absent() {
        let result = BuildResult {
            build_id: 3,
            diagnostics: Vec::new(),
            has_error: false,
            aborted: false,
            stats: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["buildId"], 3);
        assert_eq!(json["hasError"], false);
        assert!(json.get("stats").is_none());
    }

    #[test]
    fn stats_use_camel_case() {
        let stats = BuildStats {
            transpile_build_count: 2,
            files_written: vec![PathBuf::from("/www/app.js")],
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["transpileBuildCount"], 2);
        assert_eq!(json["filesWritten"][0], "/www/app.js");
    }
}
