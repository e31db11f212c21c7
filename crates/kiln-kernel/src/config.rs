//! Build configuration.
//!
//! Usually loaded from a `kiln.toml`:
//!
//! ```toml
//! fs_namespace = "app"
//! dev_mode = true
//! watch = true
//! build_stats = false
//! root_dir = "/project"
//! ```
//!
//! Every key is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Settings the build engine reads. Compile-step settings live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Namespace of the compiled app, shown in build log lines.
    pub fs_namespace: String,
    pub dev_mode: bool,
    /// Whether a watcher keeps the process alive between builds.
    pub watch: bool,
    /// Attach [`BuildStats`](kiln_types::BuildStats) to every build result.
    pub build_stats: bool,
    /// Disk root that overlay paths resolve against on the real disk.
    pub root_dir: PathBuf,
    /// Capacity of the build event channel. Slow subscribers lag past this.
    pub event_capacity: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            fs_namespace: "app".to_string(),
            dev_mode: true,
            watch: false,
            build_stats: false,
            root_dir: PathBuf::from("/"),
            event_capacity: 16,
        }
    }
}

impl BuildConfig {
    /// Production build: no watcher, prod mode.
    pub fn production(fs_namespace: &str) -> Self {
        Self {
            fs_namespace: fs_namespace.to_string(),
            dev_mode: false,
            ..Self::default()
        }
    }

    /// Dev server build: watching, dev mode.
    pub fn watching(fs_namespace: &str) -> Self {
        Self {
            fs_namespace: fs_namespace.to_string(),
            dev_mode: true,
            watch: true,
            ..Self::default()
        }
    }

    /// Enable build statistics on results.
    pub fn with_build_stats(mut self, enabled: bool) -> Self {
        self.build_stats = enabled;
        self
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fs_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("fs_namespace must not be empty".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// "dev" or "prod", as shown in log lines.
    pub fn mode(&self) -> &'static str {
        if self.dev_mode { "dev" } else { "prod" }
    }
}
