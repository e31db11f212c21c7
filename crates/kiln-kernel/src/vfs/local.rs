//! Local filesystem backend.
//!
//! Maps the overlay's absolute paths onto a real directory tree.

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::traits::{DirEntry, EntryKind, Filesystem};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `read("/src/main.tsx")` reads
/// `/home/amy/project/src/main.tsx`. Use `LocalFs::new("/")` to address the
/// whole disk.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Create a new local filesystem rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an overlay path to a real path within the root.
    ///
    /// Components are normalized without touching the disk, and `..` may
    /// not climb above the root.
    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Normal(c) => {
                    resolved.push(c);
                    depth += 1;
                }
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::PermissionDenied,
                            format!("path escapes root: {}", path.display()),
                        ));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        Ok(resolved)
    }

    fn entry_from(name: String, meta: &std::fs::Metadata) -> DirEntry {
        // Special files (sockets, pipes, devices) count as files.
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        DirEntry {
            name,
            kind,
            size: if meta.is_dir() { 0 } else { meta.len() },
        }
    }

    fn name_of(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string())
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(self.resolve(path)?, data).await
    }

    async fn list(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            // stat follows symlinks, like the rest of the overlay
            let metadata = fs::metadata(entry.path()).await?;
            entries.push(Self::entry_from(
                entry.file_name().to_string_lossy().into_owned(),
                &metadata,
            ));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &Path) -> io::Result<DirEntry> {
        let meta = fs::metadata(self.resolve(path)?).await?;
        Ok(Self::entry_from(Self::name_of(path), &meta))
    }

    async fn mkdir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(self.resolve(path)?).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?).await
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(self.resolve(path)?).await
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(self.resolve(from)?, self.resolve(to)?).await?;
        Ok(())
    }

    fn read_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path)?)
    }

    fn stat_sync(&self, path: &Path) -> io::Result<DirEntry> {
        let meta = std::fs::metadata(self.resolve(path)?)?;
        Ok(Self::entry_from(Self::name_of(path), &meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (LocalFs, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (LocalFs::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (fs, _dir) = setup();

        fs.write(Path::new("/test.txt"), b"hello").await.unwrap();
        let data = fs.read(Path::new("/test.txt")).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_write_does_not_create_parents() {
        let (fs, _dir) = setup();

        let result = fs.write(Path::new("/a/b.txt"), b"x").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);

        fs.mkdir(Path::new("/a")).await.unwrap();
        fs.write(Path::new("/a/b.txt"), b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_and_stat() {
        let (fs, _dir) = setup();

        fs.write(Path::new("/b.txt"), b"b").await.unwrap();
        fs.write(Path::new("/a.txt"), b"aa").await.unwrap();
        fs.mkdir(Path::new("/subdir")).await.unwrap();

        let entries = fs.list(Path::new("/")).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "subdir"]);

        let file = fs.stat(Path::new("/a.txt")).await.unwrap();
        assert!(file.is_file());
        assert_eq!(file.size, 2);
        assert!(fs.stat(Path::new("/subdir")).await.unwrap().is_dir());
        assert!(fs.stat_sync(Path::new("/subdir")).unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_remove_dir_requires_empty() {
        let (fs, _dir) = setup();

        fs.mkdir(Path::new("/d")).await.unwrap();
        fs.write(Path::new("/d/f"), b"x").await.unwrap();
        assert!(fs.remove_dir(Path::new("/d")).await.is_err());

        fs.remove_file(Path::new("/d/f")).await.unwrap();
        fs.remove_dir(Path::new("/d")).await.unwrap();
        assert!(fs.stat(Path::new("/d")).await.is_err());
    }

    #[tokio::test]
    async fn test_path_escape_blocked() {
        let (fs, _dir) = setup();

        let result = fs.read(Path::new("../../../etc/passwd")).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_copy_file() {
        let (fs, _dir) = setup();

        fs.write(Path::new("/src.txt"), b"copy me").await.unwrap();
        fs.copy_file(Path::new("/src.txt"), Path::new("/dest.txt"))
            .await
            .unwrap();
        assert_eq!(fs.read_sync(Path::new("/dest.txt")).unwrap(), b"copy me");
    }
}
