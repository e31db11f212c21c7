//! Disk adapter trait and the metadata types it returns.

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Kind of filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_file(self) -> bool {
        self == EntryKind::File
    }

    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// A directory entry, also used as the result of `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            size: 0,
        }
    }

    /// Create a new file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// The real filesystem primitives the overlay commits to.
///
/// Implementations may be backed by a real disk ([`LocalFs`](super::LocalFs))
/// or held in memory ([`MemoryFs`](super::MemoryFs)). Paths are absolute and
/// already normalized by the caller. Every operation may fail.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Read the entire contents of a file.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write data to a file, replacing it if it exists.
    ///
    /// The parent directory must already exist.
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// List entries in a directory, sorted by name.
    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Get metadata for a file or directory.
    async fn stat(&self, path: &Path) -> io::Result<DirEntry>;

    /// Create a single directory. The parent must exist.
    ///
    /// Returns `AlreadyExists` if something is already at `path`.
    async fn mkdir(&self, path: &Path) -> io::Result<()>;

    /// Remove a file.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory.
    async fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Copy a file's contents to `to`, replacing it if it exists.
    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        let data = self.read(from).await?;
        self.write(to, &data).await
    }

    /// Read a file and decode it as UTF-8.
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let data = self.read(path).await?;
        String::from_utf8(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Synchronous read, for callers that cannot await.
    fn read_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        let _ = path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "synchronous reads not supported by this filesystem",
        ))
    }

    /// Synchronous stat, for callers that cannot await.
    fn stat_sync(&self, path: &Path) -> io::Result<DirEntry> {
        let _ = path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "synchronous stat not supported by this filesystem",
        ))
    }
}
