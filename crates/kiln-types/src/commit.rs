//! What a VFS commit did to the disk.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The kind of disk operation a commit performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOp {
    EnsureDir,
    WriteFile,
    CopyFile,
    DeleteFile,
    DeleteDir,
}

impl fmt::Display for CommitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitOp::EnsureDir => "ensure dir",
            CommitOp::WriteFile => "write file",
            CommitOp::CopyFile => "copy file",
            CommitOp::DeleteFile => "delete file",
            CommitOp::DeleteDir => "delete dir",
        };
        f.write_str(name)
    }
}

/// A single path that could not be committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitFailure {
    pub op: CommitOp,
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for CommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.op, self.path.display(), self.message)
    }
}

/// Paths actually touched by one commit. Every list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub files_written: Vec<PathBuf>,
    /// Destinations of completed copies.
    pub files_copied: Vec<PathBuf>,
    pub files_deleted: Vec<PathBuf>,
    pub dirs_deleted: Vec<PathBuf>,
    pub dirs_added: Vec<PathBuf>,
    /// Per-path failures. A commit is best-effort and keeps going past these.
    pub failures: Vec<CommitFailure>,
}

impl CommitSummary {
    /// True when nothing was touched and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.files_written.is_empty()
            && self.files_copied.is_empty()
            && self.files_deleted.is_empty()
            && self.dirs_deleted.is_empty()
            && self.dirs_added.is_empty()
            && self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
