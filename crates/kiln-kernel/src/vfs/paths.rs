//! Path algebra for the overlay.
//!
//! Every path that enters the VFS goes through [`normalize`] first, so that
//! two spellings of the same logical path land on the same cache entry:
//! absolute, forward slashes only, `.` and `..` resolved, no trailing slash.

use std::path::{Component, Path, PathBuf};

/// Normalize a path: make it absolute, convert `\` to `/`, resolve `.` and
/// `..`, drop empty segments and any trailing slash.
///
/// `..` at the root stays at the root. Relative inputs are taken relative
/// to `/`.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let raw = path.as_ref().to_string_lossy().replace('\\', "/");

    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(raw.len() + 1);
    out.push('/');
    out.push_str(&segments.join("/"));
    PathBuf::from(out)
}

/// Join a relative segment (or several, slash-separated) onto `base`.
pub fn join(base: impl AsRef<Path>, segment: impl AsRef<Path>) -> PathBuf {
    let base = base.as_ref().to_string_lossy().into_owned();
    let segment = segment.as_ref().to_string_lossy().into_owned();
    normalize(format!("{}/{}", base, segment))
}

/// Parent directory of a normalized path. The root is its own parent.
pub fn dirname(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Relative path from `from` to `to`, both normalized.
///
/// Returns an empty path when they are equal; leading `..` components mean
/// `to` is outside `from`.
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// True if `path` is `dir` itself or lexically beneath it.
///
/// Containment is decided on the relative path, so `/a` does not contain
/// `/ab` even though one is a string prefix of the other.
pub fn is_within(dir: &Path, path: &Path) -> bool {
    !matches!(
        relative(dir, path).components().next(),
        Some(Component::ParentDir)
    )
}

/// Number of named segments: `/` is 0, `/a` is 1, `/a/b` is 2.
pub fn depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Ancestor directories of a normalized path, nearest first, excluding the
/// path itself and the root.
pub fn ancestors(path: &Path) -> impl Iterator<Item = &Path> {
    path.ancestors().skip(1).filter(|p| depth(p) > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/a/b/c", "/a/b/c")]
    #[case("/a/b/c/", "/a/b/c")]
    #[case("a/b", "/a/b")]
    #[case("/a/./b", "/a/b")]
    #[case("/a/x/../b", "/a/b")]
    #[case("/a//b", "/a/b")]
    #[case("\\a\\b", "/a/b")]
    #[case("/..", "/")]
    #[case("", "/")]
    fn normalize_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), PathBuf::from(expected));
    }

    #[test]
    fn join_normalizes() {
        assert_eq!(join("/src", "a.txt"), PathBuf::from("/src/a.txt"));
        assert_eq!(join("/src/", "../www/b"), PathBuf::from("/www/b"));
    }

    #[test]
    fn dirname_of_root_is_root() {
        assert_eq!(dirname(Path::new("/a/b")), PathBuf::from("/a"));
        assert_eq!(dirname(Path::new("/a")), PathBuf::from("/"));
        assert_eq!(dirname(Path::new("/")), PathBuf::from("/"));
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative(Path::new("/a"), Path::new("/a/b/c")),
            PathBuf::from("b/c")
        );
        assert_eq!(
            relative(Path::new("/a/b"), Path::new("/a/c")),
            PathBuf::from("../c")
        );
        assert_eq!(relative(Path::new("/a"), Path::new("/a")), PathBuf::new());
    }

    #[test]
    fn is_within_is_not_a_string_prefix() {
        assert!(is_within(Path::new("/a"), Path::new("/a")));
        assert!(is_within(Path::new("/a"), Path::new("/a/b/c")));
        assert!(!is_within(Path::new("/a"), Path::new("/ab")));
        assert!(!is_within(Path::new("/a"), Path::new("/ab/c")));
        assert!(!is_within(Path::new("/a/b"), Path::new("/a")));
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(depth(Path::new("/")), 0);
        assert_eq!(depth(Path::new("/a")), 1);
        assert_eq!(depth(Path::new("/a/b/c")), 3);
    }

    #[test]
    fn ancestors_skip_self_and_root() {
        let found: Vec<&Path> = ancestors(Path::new("/a/b/c")).collect();
        assert_eq!(found, vec![Path::new("/a/b"), Path::new("/a")]);
        assert_eq!(ancestors(Path::new("/a")).count(), 0);
    }
}
