//! Error types for the kernel.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by [`Vfs`](crate::vfs::Vfs) reads.
///
/// Absence is not always an error: `exists` swallows it, and commits treat
/// an already-missing path as nothing to delete. Everything else here is a
/// genuine failure the caller has to see.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// The overlay knows the path does not exist (for example, it is queued
    /// for deletion).
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The disk adapter failed.
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True for overlay absence and for adapter `NotFound` errors.
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound { .. } => true,
            VfsError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
        }
    }
}

/// Errors loading a [`BuildConfig`](crate::config::BuildConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_covers_both_variants() {
        let overlay = VfsError::NotFound {
            path: PathBuf::from("/a"),
        };
        assert!(overlay.is_not_found());

        let disk = VfsError::io(
            "read",
            "/a",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(disk.is_not_found());

        let denied = VfsError::io(
            "read",
            "/a",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(!denied.is_not_found());
        assert_eq!(denied.to_string(), "read /a: nope");
    }
}
