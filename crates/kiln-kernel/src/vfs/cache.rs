//! Overlay cache entries.
//!
//! The overlay is a small write-ahead log keyed by path: each entry caches
//! what is known about the path on disk and carries at most one pending
//! operation to apply at the next commit.

use std::collections::HashMap;
use std::path::PathBuf;

use super::traits::EntryKind;

/// The disk operation queued for a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PendingOp {
    #[default]
    None,
    /// Write the cached text to disk.
    Write,
    /// Delete the file or directory.
    Delete,
    /// Make sure the directory exists.
    EnsureDir,
}

/// Everything the overlay knows about one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    /// `None` until a stat, read or write has told us.
    pub exists: Option<bool>,
    pub kind: Option<EntryKind>,
    /// Last known contents: what is on disk, or what will be after commit.
    pub text: Option<String>,
    /// Set when `text` came from an in-memory-only write and differs from
    /// what is on disk. A later disk write must not be skipped as identical.
    pub memory_only: bool,
    pub pending: PendingOp,
}

impl CacheEntry {
    /// An existing entry of known kind, as learned from a stat.
    pub fn existing(kind: EntryKind) -> Self {
        Self {
            exists: Some(true),
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// An entry known not to exist.
    pub fn missing() -> Self {
        Self {
            exists: Some(false),
            ..Self::default()
        }
    }

    /// True when the cache can vouch that a directory is on disk.
    pub fn is_existing_dir(&self) -> bool {
        self.exists == Some(true) && self.kind == Some(EntryKind::Directory)
    }
}

/// A queued copy. Copies are never read back, so they live beside the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// The overlay map itself, keyed by normalized absolute path.
pub type OverlayCache = HashMap<PathBuf, CacheEntry>;
