//! Commit planning.
//!
//! Turns the overlay's pending operations into an ordered, deduplicated set
//! of disk instructions. Pure: no I/O happens here, the plan is executed by
//! [`Vfs::commit`](super::Vfs::commit).
//!
//! Execution order is fixed:
//!
//! ```text
//! ensure dirs (shallow → deep)
//!   → write files ∥ copy files
//!     → delete files
//!       → delete dirs (deep → shallow)
//! ```

use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::cache::{CopyTask, OverlayCache, PendingOp};
use super::paths;
use super::traits::EntryKind;

/// Disk instructions derived from one snapshot of the overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPlan {
    /// Shallowest first; never contains the root or an implied parent the
    /// cache already knows exists.
    pub dirs_to_ensure: Vec<PathBuf>,
    pub files_to_write: Vec<PathBuf>,
    pub files_to_delete: Vec<PathBuf>,
    /// Deepest first; never contains a directory that is also ensured.
    pub dirs_to_delete: Vec<PathBuf>,
    pub copy_tasks: Vec<CopyTask>,
}

impl CommitPlan {
    /// Build a plan and consume every pending operation in `cache`.
    pub fn build(cache: &mut OverlayCache, copy_tasks: Vec<CopyTask>) -> Self {
        let mut files_to_write = Vec::new();
        let mut files_to_delete = Vec::new();
        let mut dirs_to_delete = Vec::new();
        let mut ensure: HashSet<PathBuf> = HashSet::new();
        let mut explicit: HashSet<PathBuf> = HashSet::new();

        // One pending op per path: a write issued after a delete has already
        // replaced it, so the two lists can't overlap.
        for (path, entry) in cache.iter_mut() {
            match entry.pending {
                PendingOp::None => continue,
                PendingOp::Write => {
                    files_to_write.push(path.clone());
                    ensure.insert(paths::dirname(path));
                }
                PendingOp::EnsureDir => {
                    ensure.insert(path.clone());
                    explicit.insert(path.clone());
                }
                PendingOp::Delete => match entry.kind {
                    Some(EntryKind::Directory) => dirs_to_delete.push(path.clone()),
                    Some(EntryKind::File) | None => files_to_delete.push(path.clone()),
                },
            }
            entry.pending = PendingOp::None;
        }

        for task in &copy_tasks {
            ensure.insert(paths::dirname(&task.destination));
        }

        let direct: Vec<PathBuf> = ensure.iter().cloned().collect();
        for dir in &direct {
            for ancestor in paths::ancestors(dir) {
                ensure.insert(ancestor.to_path_buf());
            }
        }
        ensure.retain(|dir| paths::depth(dir) > 0);

        dirs_to_delete.retain(|dir| !ensure.contains(dir));
        dirs_to_delete.sort_by_key(|dir| Reverse(depth_key(dir)));

        // An explicit ensure-dir entry reads as existing in the overlay before
        // it is on disk, so only implied parents can be skipped.
        let mut dirs_to_ensure: Vec<PathBuf> = ensure
            .into_iter()
            .filter(|dir| {
                explicit.contains(dir) || !cache.get(dir).is_some_and(|e| e.is_existing_dir())
            })
            .collect();
        dirs_to_ensure.sort_by_key(|dir| depth_key(dir));

        files_to_write.sort();
        files_to_delete.sort();

        Self {
            dirs_to_ensure,
            files_to_write,
            files_to_delete,
            dirs_to_delete,
            copy_tasks,
        }
    }

    /// True when committing this plan would not touch the disk.
    pub fn is_empty(&self) -> bool {
        self.dirs_to_ensure.is_empty()
            && self.files_to_write.is_empty()
            && self.files_to_delete.is_empty()
            && self.dirs_to_delete.is_empty()
            && self.copy_tasks.is_empty()
    }
}

/// Sort key: fewer segments first, then shorter paths, then lexical.
fn depth_key(path: &Path) -> (usize, usize, PathBuf) {
    (
        paths::depth(path),
        path.as_os_str().len(),
        path.to_path_buf(),
    )
}

/// Split an ordered directory list into runs of equal depth, keeping order.
///
/// Directories within one run don't depend on each other and can be
/// processed concurrently.
pub(crate) fn depth_levels(dirs: &[PathBuf]) -> Vec<&[PathBuf]> {
    let mut levels = Vec::new();
    let mut start = 0;
    for i in 1..=dirs.len() {
        if i == dirs.len() || paths::depth(&dirs[i]) != paths::depth(&dirs[start]) {
            if start < i {
                levels.push(&dirs[start..i]);
            }
            start = i;
        }
    }
    levels
}
