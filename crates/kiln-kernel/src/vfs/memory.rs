//! In-memory disk adapter.
//!
//! Behaves like a strict POSIX disk (no implicit parent creation, `rmdir`
//! only on empty directories) so commit ordering bugs surface in tests.
//! Every adapter call is recorded in a journal that tests can inspect to
//! tell cache hits from real disk access.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use super::paths;
use super::traits::{DirEntry, Filesystem};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8> },
    Directory,
}

/// One adapter call, as seen by the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskOp {
    Read(PathBuf),
    Write(PathBuf),
    List(PathBuf),
    Stat(PathBuf),
    Mkdir(PathBuf),
    RemoveFile(PathBuf),
    RemoveDir(PathBuf),
    Copy { from: PathBuf, to: PathBuf },
}

/// In-memory filesystem.
///
/// Thread-safe via internal locks; locks are never held across an await.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<BTreeMap<PathBuf, Entry>>,
    journal: Mutex<Vec<DiskOp>>,
    read_only: AtomicBool,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("not found: {}", path.display()),
    )
}

impl MemoryFs {
    /// Create a new filesystem holding only the root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), Entry::Directory);
        Self {
            entries: RwLock::new(entries),
            journal: Mutex::new(Vec::new()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Seed a file, creating parent directories. Not journaled.
    pub fn insert_file(&self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) {
        let path = paths::normalize(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for ancestor in paths::ancestors(&path) {
            entries
                .entry(ancestor.to_path_buf())
                .or_insert(Entry::Directory);
        }
        entries.insert(
            path,
            Entry::File {
                data: data.as_ref().to_vec(),
            },
        );
    }

    /// Seed a directory, creating parent directories. Not journaled.
    pub fn insert_dir(&self, path: impl AsRef<Path>) {
        let path = paths::normalize(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for ancestor in paths::ancestors(&path) {
            entries
                .entry(ancestor.to_path_buf())
                .or_insert(Entry::Directory);
        }
        entries.entry(path).or_insert(Entry::Directory);
    }

    /// Reject every mutation with `PermissionDenied` while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// All adapter calls recorded so far, oldest first.
    pub fn journal(&self) -> Vec<DiskOp> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget recorded calls.
    pub fn clear_journal(&self) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count_ops(&self, pred: impl Fn(&DiskOp) -> bool) -> usize {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|op| pred(op))
            .count()
    }

    /// Every path currently stored, sorted. Handy for asserting disk state.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Contents of a file as UTF-8, bypassing the journal.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        let path = paths::normalize(path);
        match self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path)
        {
            Some(Entry::File { data }) => String::from_utf8(data.clone()).ok(),
            _ => None,
        }
    }

    fn record(&self, op: DiskOp) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "filesystem is read-only",
            ))
        } else {
            Ok(())
        }
    }

    /// The parent of `path` must be an existing directory.
    fn check_parent(entries: &BTreeMap<PathBuf, Entry>, path: &Path) -> io::Result<()> {
        let parent = paths::dirname(path);
        match entries.get(&parent) {
            Some(Entry::Directory) => Ok(()),
            Some(Entry::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", parent.display()),
            )),
            None => Err(not_found(&parent)),
        }
    }

    fn read_inner(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = paths::normalize(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&path) {
            Some(Entry::File { data }) => Ok(data.clone()),
            Some(Entry::Directory) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(&path)),
        }
    }

    fn write_inner(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.check_writable()?;
        let path = paths::normalize(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Self::check_parent(&entries, &path)?;

        if let Some(Entry::Directory) = entries.get(&path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            ));
        }

        entries.insert(
            path,
            Entry::File {
                data: data.to_vec(),
            },
        );
        Ok(())
    }

    fn stat_inner(&self, path: &Path) -> io::Result<DirEntry> {
        let path = paths::normalize(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());

        match entries.get(&path) {
            Some(Entry::File { data }) => Ok(DirEntry::file(name, data.len() as u64)),
            Some(Entry::Directory) => Ok(DirEntry::directory(name)),
            None => Err(not_found(&path)),
        }
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.record(DiskOp::Read(path.to_path_buf()));
        self.read_inner(path)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.record(DiskOp::Write(path.to_path_buf()));
        self.write_inner(path, data)
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.record(DiskOp::List(path.to_path_buf()));
        let normalized = paths::normalize(path);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        match entries.get(&normalized) {
            Some(Entry::Directory) => {}
            Some(Entry::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {}", path.display()),
                ));
            }
            None => return Err(not_found(path)),
        }

        // BTreeMap iteration keeps children sorted by name
        let mut result = Vec::new();
        for (entry_path, entry) in entries.iter() {
            if entry_path.parent() != Some(normalized.as_path()) {
                continue;
            }
            if let Some(name) = entry_path.file_name() {
                let name = name.to_string_lossy().into_owned();
                result.push(match entry {
                    Entry::File { data } => DirEntry::file(name, data.len() as u64),
                    Entry::Directory => DirEntry::directory(name),
                });
            }
        }
        Ok(result)
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        self.record(DiskOp::Stat(path.to_path_buf()));
        self.stat_inner(path)
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        self.record(DiskOp::Mkdir(path.to_path_buf()));
        self.check_writable()?;
        let normalized = paths::normalize(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.contains_key(&normalized) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already exists: {}", path.display()),
            ));
        }
        Self::check_parent(&entries, &normalized)?;

        entries.insert(normalized, Entry::Directory);
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.record(DiskOp::RemoveFile(path.to_path_buf()));
        self.check_writable()?;
        let normalized = paths::normalize(path);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        match entries.get(&normalized) {
            Some(Entry::File { .. }) => {
                entries.remove(&normalized);
                Ok(())
            }
            Some(Entry::Directory) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        self.record(DiskOp::RemoveDir(path.to_path_buf()));
        self.check_writable()?;
        let normalized = paths::normalize(path);

        if paths::depth(&normalized) == 0 {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot remove root directory",
            ));
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&normalized) {
            Some(Entry::Directory) => {
                let has_children = entries
                    .keys()
                    .any(|k| k.parent() == Some(normalized.as_path()));
                if has_children {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        format!("directory not empty: {}", path.display()),
                    ));
                }
                entries.remove(&normalized);
                Ok(())
            }
            Some(Entry::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("not a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record(DiskOp::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        });
        let data = self.read_inner(from)?;
        self.write_inner(to, &data)
    }

    fn read_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.record(DiskOp::Read(path.to_path_buf()));
        self.read_inner(path)
    }

    fn stat_sync(&self, path: &Path) -> io::Result<DirEntry> {
        self.record(DiskOp::Stat(path.to_path_buf()));
        self.stat_inner(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::EntryKind;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/test.txt"), b"hello world").await.unwrap();
        let data = fs.read(Path::new("/test.txt")).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let fs = MemoryFs::new();
        let result = fs.read(Path::new("/nonexistent.txt")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_write_requires_parent() {
        let fs = MemoryFs::new();
        let result = fs.write(Path::new("/a/b/file.txt"), b"nested").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);

        fs.mkdir(Path::new("/a")).await.unwrap();
        fs.mkdir(Path::new("/a/b")).await.unwrap();
        fs.write(Path::new("/a/b/file.txt"), b"nested").await.unwrap();
        assert_eq!(fs.contents("/a/b/file.txt").as_deref(), Some("nested"));
    }

    #[tokio::test]
    async fn test_mkdir_is_not_recursive() {
        let fs = MemoryFs::new();
        let result = fs.mkdir(Path::new("/a/b")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);

        fs.mkdir(Path::new("/a")).await.unwrap();
        let again = fs.mkdir(Path::new("/a")).await;
        assert_eq!(again.unwrap_err().kind(), io::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_list_directory() {
        let fs = MemoryFs::new();
        fs.insert_file("/b.txt", "b");
        fs.insert_file("/a.txt", "a");
        fs.insert_dir("/subdir");
        fs.insert_file("/subdir/deep.txt", "d");

        let entries = fs.list(Path::new("/")).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "subdir"]);
        assert!(entries[2].is_dir());
    }

    #[tokio::test]
    async fn test_remove_non_empty_directory_fails() {
        let fs = MemoryFs::new();
        fs.insert_file("/dir/file.txt", "data");

        let result = fs.remove_dir(Path::new("/dir")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::DirectoryNotEmpty);

        fs.remove_file(Path::new("/dir/file.txt")).await.unwrap();
        fs.remove_dir(Path::new("/dir")).await.unwrap();
        assert_eq!(fs.paths(), vec![PathBuf::from("/")]);
    }

    #[tokio::test]
    async fn test_read_only_rejects_mutation() {
        let fs = MemoryFs::new();
        fs.set_read_only(true);
        let result = fs.mkdir(Path::new("/x")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_journal_records_calls() {
        let fs = MemoryFs::new();
        fs.insert_file("/a.txt", "a");
        let _ = fs.stat(Path::new("/a.txt")).await;
        let _ = fs.read(Path::new("/a.txt")).await;
        assert_eq!(
            fs.journal(),
            vec![
                DiskOp::Stat(PathBuf::from("/a.txt")),
                DiskOp::Read(PathBuf::from("/a.txt")),
            ]
        );
        fs.clear_journal();
        assert!(fs.journal().is_empty());
    }

    #[tokio::test]
    async fn test_copy_file() {
        let fs = MemoryFs::new();
        fs.insert_file("/src/logo.svg", "<svg/>");
        fs.insert_dir("/www");
        fs.copy_file(Path::new("/src/logo.svg"), Path::new("/www/logo.svg"))
            .await
            .unwrap();
        assert_eq!(fs.contents("/www/logo.svg").as_deref(), Some("<svg/>"));
    }

    #[test]
    fn test_sync_variants() {
        let fs = MemoryFs::new();
        fs.insert_file("/a.txt", "a");
        assert_eq!(fs.read_sync(Path::new("/a.txt")).unwrap(), b"a");
        assert!(fs.stat_sync(Path::new("/a.txt")).unwrap().is_file());
        assert_eq!(fs.stat_sync(Path::new("/")).unwrap().kind, EntryKind::Directory);
    }
}
