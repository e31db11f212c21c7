//! The transactional overlay.
//!
//! [`Vfs`] sits between compilation steps and the disk. Reads are served from
//! cache when possible; writes, deletes, copies and directory creation are
//! only recorded, and reach the disk in one ordered batch on [`Vfs::commit`].
//!
//! # Concurrency
//!
//! The overlay state lives behind a `std::sync::Mutex` that is never held
//! across an `.await`. Disk adapter calls are the only suspension points, so
//! each cache mutation is atomic with respect to other logical operations.
//! When a disk answer arrives, it only fills in facts the cache does not
//! already have: a write that landed while a stat was in flight wins.

use futures::future::join_all;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kiln_types::{CommitFailure, CommitOp, CommitSummary};

use super::cache::{CacheEntry, CopyTask, OverlayCache, PendingOp};
use super::paths;
use super::plan::{depth_levels, CommitPlan};
use super::traits::{DirEntry, EntryKind, Filesystem};
use crate::error::VfsError;

/// Options for [`Vfs::write_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Keep the content in the overlay only; never queue it for disk.
    pub in_memory_only: bool,
}

impl WriteOptions {
    pub fn in_memory() -> Self {
        Self {
            in_memory_only: true,
        }
    }
}

/// Predicate over `(source, destination)`; returning `false` skips the copy.
pub type CopyFilter = dyn Fn(&Path, &Path) -> bool + Send + Sync;

/// Options for [`Vfs::copy`], [`Vfs::copy_file`] and [`Vfs::copy_dir`].
#[derive(Clone, Copy, Default)]
pub struct CopyOptions<'a> {
    pub filter: Option<&'a CopyFilter>,
}

impl<'a> CopyOptions<'a> {
    pub fn filter(filter: &'a CopyFilter) -> Self {
        Self {
            filter: Some(filter),
        }
    }
}

#[derive(Debug, Default)]
struct OverlayState {
    entries: OverlayCache,
    copy_tasks: Vec<CopyTask>,
}

/// Transactional virtual filesystem over a disk adapter.
pub struct Vfs {
    disk: Arc<dyn Filesystem>,
    state: Mutex<OverlayState>,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Vfs")
            .field("entries", &state.entries.len())
            .field("copy_tasks", &state.copy_tasks.len())
            .finish()
    }
}

/// Fill in what a disk answer says, without overriding newer overlay facts.
fn learn(entry: &mut CacheEntry, kind: EntryKind) {
    if entry.pending == PendingOp::Delete {
        return;
    }
    if entry.exists.is_none() {
        entry.exists = Some(true);
    }
    if entry.kind.is_none() {
        entry.kind = Some(kind);
    }
}

fn mark_deleted(entry: &mut CacheEntry, kind: EntryKind) {
    // A later write of the same text must still reach the disk.
    entry.text = None;
    entry.pending = PendingOp::Delete;
    entry.exists = Some(false);
    entry.memory_only = false;
    if entry.kind.is_none() {
        entry.kind = Some(kind);
    }
}

fn failure(op: CommitOp, path: &Path, error: &io::Error) -> CommitFailure {
    tracing::warn!(path = %path.display(), error = %error, "commit: {} failed", op);
    CommitFailure {
        op,
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

impl Vfs {
    /// Create an overlay over the given disk adapter.
    pub fn new(disk: Arc<dyn Filesystem>) -> Self {
        Self {
            disk,
            state: Mutex::new(OverlayState::default()),
        }
    }

    /// The underlying disk adapter.
    pub fn disk(&self) -> &Arc<dyn Filesystem> {
        &self.disk
    }

    fn state(&self) -> MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the cache entry for a path, if any.
    pub fn cached(&self, path: impl AsRef<Path>) -> Option<CacheEntry> {
        let path = paths::normalize(path);
        self.state().entries.get(&path).cloned()
    }

    /// True when there is anything left to commit.
    pub fn has_pending(&self) -> bool {
        let state = self.state();
        !state.copy_tasks.is_empty()
            || state
                .entries
                .values()
                .any(|e| e.pending != PendingOp::None)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    fn cached_exists(&self, path: &Path) -> Option<bool> {
        self.state().entries.get(path).and_then(|e| e.exists)
    }

    fn record_exists(&self, path: &Path, found: Option<EntryKind>) -> bool {
        let mut state = self.state();
        let entry = state.entries.entry(path.to_path_buf()).or_default();
        if let Some(known) = entry.exists {
            return known;
        }
        match found {
            Some(kind) => {
                learn(entry, kind);
                true
            }
            None => {
                entry.exists = Some(false);
                false
            }
        }
    }

    /// Whether a path exists.
    ///
    /// Known existence is answered from cache. Otherwise the disk is stat'ed
    /// and the outcome cached; a failed stat counts as "does not exist".
    pub async fn exists(&self, path: impl AsRef<Path>) -> bool {
        let path = paths::normalize(path);
        if let Some(known) = self.cached_exists(&path) {
            return known;
        }
        let found = self.disk.stat(&path).await.ok().map(|e| e.kind);
        self.record_exists(&path, found)
    }

    /// Synchronous [`exists`](Self::exists).
    pub fn exists_sync(&self, path: impl AsRef<Path>) -> bool {
        let path = paths::normalize(path);
        if let Some(known) = self.cached_exists(&path) {
            return known;
        }
        let found = self.disk.stat_sync(&path).ok().map(|e| e.kind);
        self.record_exists(&path, found)
    }

    fn cached_kind(&self, path: &Path) -> Result<Option<EntryKind>, VfsError> {
        match self.state().entries.get(path) {
            Some(entry) if entry.exists == Some(false) => Err(VfsError::NotFound {
                path: path.to_path_buf(),
            }),
            Some(entry) => Ok(entry.kind),
            None => Ok(None),
        }
    }

    fn record_stat(&self, path: &Path, found: &DirEntry) -> EntryKind {
        let mut state = self.state();
        let entry = state.entries.entry(path.to_path_buf()).or_default();
        learn(entry, found.kind);
        entry.kind.unwrap_or(found.kind)
    }

    /// File or directory?
    ///
    /// Served from cache when the kind is known. A disk failure propagates:
    /// unlike [`exists`](Self::exists), absence is an error here.
    pub async fn stat(&self, path: impl AsRef<Path>) -> Result<EntryKind, VfsError> {
        let path = paths::normalize(path);
        if let Some(kind) = self.cached_kind(&path)? {
            return Ok(kind);
        }
        let found = self
            .disk
            .stat(&path)
            .await
            .map_err(|e| VfsError::io("stat", &path, e))?;
        Ok(self.record_stat(&path, &found))
    }

    /// Synchronous [`stat`](Self::stat).
    pub fn stat_sync(&self, path: impl AsRef<Path>) -> Result<EntryKind, VfsError> {
        let path = paths::normalize(path);
        if let Some(kind) = self.cached_kind(&path)? {
            return Ok(kind);
        }
        let found = self
            .disk
            .stat_sync(&path)
            .map_err(|e| VfsError::io("stat", &path, e))?;
        Ok(self.record_stat(&path, &found))
    }

    fn cached_text(&self, path: &Path) -> Result<Option<String>, VfsError> {
        match self.state().entries.get(path) {
            Some(entry) if entry.exists == Some(false) => Err(VfsError::NotFound {
                path: path.to_path_buf(),
            }),
            Some(entry) if entry.exists == Some(true) => Ok(entry.text.clone()),
            _ => Ok(None),
        }
    }

    fn record_read(&self, path: &Path, text: String) -> String {
        let mut state = self.state();
        let entry = state.entries.entry(path.to_path_buf()).or_default();
        if entry.exists == Some(true) {
            if let Some(newer) = &entry.text {
                return newer.clone();
            }
        }
        entry.exists = Some(true);
        entry.kind = Some(EntryKind::File);
        entry.memory_only = false;
        entry.text = Some(text.clone());
        text
    }

    /// Read a file as UTF-8 text.
    ///
    /// Cached text is returned without touching the disk. On a miss the
    /// file is read and its text cached. Failures propagate.
    pub async fn read_file(&self, path: impl AsRef<Path>) -> Result<String, VfsError> {
        let path = paths::normalize(path);
        if let Some(text) = self.cached_text(&path)? {
            return Ok(text);
        }
        let text = self
            .disk
            .read_to_string(&path)
            .await
            .map_err(|e| VfsError::io("read", &path, e))?;
        Ok(self.record_read(&path, text))
    }

    /// Synchronous [`read_file`](Self::read_file).
    pub fn read_file_sync(&self, path: impl AsRef<Path>) -> Result<String, VfsError> {
        let path = paths::normalize(path);
        if let Some(text) = self.cached_text(&path)? {
            return Ok(text);
        }
        let text = self
            .disk
            .read_sync(&path)
            .and_then(|data| {
                String::from_utf8(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .map_err(|e| VfsError::io("read", &path, e))?;
        Ok(self.record_read(&path, text))
    }

    /// List a directory's entry names, sorted.
    ///
    /// Always a real disk listing: directory contents are never served from
    /// cache. The directory and each child are cached as existing.
    pub async fn readdir(&self, path: impl AsRef<Path>) -> Result<Vec<String>, VfsError> {
        let dir = paths::normalize(path);
        let listing = self
            .disk
            .list(&dir)
            .await
            .map_err(|e| VfsError::io("list", &dir, e))?;

        let mut state = self.state();
        learn(
            state.entries.entry(dir.clone()).or_default(),
            EntryKind::Directory,
        );
        let mut names = Vec::with_capacity(listing.len());
        for item in listing {
            let child = paths::join(&dir, &item.name);
            learn(state.entries.entry(child).or_default(), item.kind);
            names.push(item.name);
        }
        Ok(names)
    }

    // ---------------------------------------------------------------------
    // Queued mutations
    // ---------------------------------------------------------------------

    /// Write a file through the overlay. Never touches the disk.
    ///
    /// The cached text is always updated and any pending delete is
    /// cancelled. A disk write is queued only when the text differs from
    /// what is cached, so rewriting identical content is free. Returns
    /// whether a disk write is pending for the path afterwards.
    pub fn write_file(
        &self,
        path: impl AsRef<Path>,
        text: impl Into<String>,
        opts: WriteOptions,
    ) -> bool {
        let path = paths::normalize(path);
        let text = text.into();
        let mut state = self.state();

        if !opts.in_memory_only {
            state.copy_tasks.retain(|t| t.destination != path);
        }

        let entry = state.entries.entry(path).or_default();
        if matches!(entry.pending, PendingOp::Delete | PendingOp::EnsureDir) {
            entry.pending = PendingOp::None;
        }
        if entry.kind == Some(EntryKind::Directory) {
            entry.text = None;
        }
        entry.exists = Some(true);
        entry.kind = Some(EntryKind::File);

        let changed = entry.text.as_deref() != Some(text.as_str());
        if opts.in_memory_only {
            if changed && entry.pending != PendingOp::Write {
                entry.memory_only = true;
            }
        } else {
            if entry.pending != PendingOp::Write && (changed || entry.memory_only) {
                entry.pending = PendingOp::Write;
            }
            entry.memory_only = false;
        }
        entry.text = Some(text);

        entry.pending == PendingOp::Write
    }

    /// Queue a file for deletion. Never touches the disk.
    ///
    /// A queued copy onto the same path is cancelled.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let path = paths::normalize(path);
        let mut state = self.state();
        state.copy_tasks.retain(|t| t.destination != path);
        mark_deleted(state.entries.entry(path).or_default(), EntryKind::File);
    }

    fn mark_dir_deleted(&self, dir: &Path) {
        let mut state = self.state();
        let entry = state.entries.entry(dir.to_path_buf()).or_default();
        entry.kind = Some(EntryKind::Directory);
        mark_deleted(entry, EntryKind::Directory);
    }

    /// Cancel queued writes, ensures and copies at or beneath `dir`.
    fn cancel_pending_under(&self, dir: &Path) {
        let mut state = self.state();
        state
            .copy_tasks
            .retain(|t| !paths::is_within(dir, &t.destination));
        for (path, entry) in state.entries.iter_mut() {
            if path.as_path() != dir
                && paths::is_within(dir, path)
                && matches!(entry.pending, PendingOp::Write | PendingOp::EnsureDir)
            {
                entry.pending = PendingOp::None;
                entry.exists = Some(false);
                entry.text = None;
                entry.memory_only = false;
            }
        }
    }

    /// Mark a directory tree for deletion, walking the live disk tree level
    /// by level. Returns whether the root directory was on disk.
    async fn remove_tree(&self, root: &Path) -> Result<bool, VfsError> {
        self.cancel_pending_under(root);
        self.mark_dir_deleted(root);

        let mut root_found = false;
        let mut level = vec![root.to_path_buf()];
        while !level.is_empty() {
            let listings = join_all(level.iter().map(|dir| self.disk.list(dir))).await;
            let mut next = Vec::new();
            for (dir, listing) in level.iter().zip(listings) {
                let listing = match listing {
                    Ok(listing) => listing,
                    // already gone: nothing beneath it to delete
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(VfsError::io("list", dir, e)),
                };
                if dir.as_path() == root {
                    root_found = true;
                }
                for item in listing {
                    let child = paths::join(dir, &item.name);
                    match item.kind {
                        EntryKind::Directory => {
                            self.mark_dir_deleted(&child);
                            next.push(child);
                        }
                        EntryKind::File => self.remove_file(&child),
                    }
                }
            }
            level = next;
        }
        Ok(root_found)
    }

    /// Queue a directory and everything beneath it for deletion.
    ///
    /// Descendants are discovered from a live disk listing, never from the
    /// cache. Writes queued beneath the directory are cancelled. A directory
    /// that does not exist on disk is not an error.
    pub async fn remove_dir(&self, path: impl AsRef<Path>) -> Result<(), VfsError> {
        let dir = paths::normalize(path);
        self.remove_tree(&dir).await.map(|_| ())
    }

    /// Queue deletion of everything inside a directory, keeping the
    /// directory itself (creating it at commit if it was missing).
    pub async fn empty_dir(&self, path: impl AsRef<Path>) -> Result<(), VfsError> {
        let dir = paths::normalize(path);
        let existed = self.remove_tree(&dir).await?;

        let mut state = self.state();
        let entry = state.entries.entry(dir).or_default();
        *entry = CacheEntry {
            pending: if existed {
                PendingOp::None
            } else {
                PendingOp::EnsureDir
            },
            ..CacheEntry::existing(EntryKind::Directory)
        };
        Ok(())
    }

    /// Queue a copy of a single file. Returns whether it was queued (the
    /// filter may veto it).
    ///
    /// Any pending operation on the destination is replaced by the copy.
    pub fn copy_file(
        &self,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        opts: CopyOptions<'_>,
    ) -> bool {
        let source = paths::normalize(src);
        let destination = paths::normalize(dest);

        if let Some(filter) = opts.filter {
            if !filter(source.as_path(), destination.as_path()) {
                return false;
            }
        }

        let mut state = self.state();
        state.entries.remove(&destination);
        state.copy_tasks.retain(|t| t.destination != destination);
        state.copy_tasks.push(CopyTask {
            source,
            destination,
        });
        true
    }

    /// Queue copies of every file under `src` into `dest`, walking the live
    /// source tree level by level.
    pub async fn copy_dir(
        &self,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        opts: CopyOptions<'_>,
    ) -> Result<(), VfsError> {
        let mut level = vec![(paths::normalize(src), paths::normalize(dest))];
        while !level.is_empty() {
            let listings = join_all(level.iter().map(|(from, _)| self.disk.list(from))).await;
            let mut next = Vec::new();
            for ((from, to), listing) in level.iter().zip(listings) {
                let listing = listing.map_err(|e| VfsError::io("list", from, e))?;
                for item in listing {
                    let child_from = paths::join(from, &item.name);
                    let child_to = paths::join(to, &item.name);
                    match item.kind {
                        EntryKind::Directory => next.push((child_from, child_to)),
                        EntryKind::File => {
                            self.copy_file(&child_from, &child_to, opts);
                        }
                    }
                }
            }
            level = next;
        }
        Ok(())
    }

    /// Queue a copy of a file or a whole directory.
    pub async fn copy(
        &self,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        opts: CopyOptions<'_>,
    ) -> Result<(), VfsError> {
        let src = paths::normalize(src);
        match self.stat(&src).await? {
            EntryKind::Directory => self.copy_dir(&src, dest, opts).await,
            EntryKind::File => {
                self.copy_file(&src, dest, opts);
                Ok(())
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commit
    // ---------------------------------------------------------------------

    /// Plan the next commit without consuming anything.
    pub fn preview_commit(&self) -> CommitPlan {
        let state = self.state();
        let mut entries = state.entries.clone();
        CommitPlan::build(&mut entries, state.copy_tasks.clone())
    }

    /// Flush every queued operation to disk.
    ///
    /// Phases run strictly in order: ensure directories (shallowest level
    /// first, each level concurrently), then writes and copies together, then
    /// file deletes, then directory deletes (deepest level first). Failures
    /// are logged and reported per path; the commit keeps going. Cache
    /// entries of deleted paths are dropped afterwards.
    pub async fn commit(&self) -> CommitSummary {
        let plan = {
            let mut state = self.state();
            let tasks = std::mem::take(&mut state.copy_tasks);
            CommitPlan::build(&mut state.entries, tasks)
        };

        let mut summary = CommitSummary::default();
        if plan.is_empty() {
            return summary;
        }

        tracing::debug!(
            dirs = plan.dirs_to_ensure.len(),
            writes = plan.files_to_write.len(),
            copies = plan.copy_tasks.len(),
            file_deletes = plan.files_to_delete.len(),
            dir_deletes = plan.dirs_to_delete.len(),
            "committing overlay"
        );

        self.commit_ensure_dirs(&plan.dirs_to_ensure, &mut summary)
            .await;
        self.commit_writes_and_copies(&plan, &mut summary).await;
        self.commit_delete_files(&plan.files_to_delete, &mut summary)
            .await;
        self.commit_delete_dirs(&plan.dirs_to_delete, &mut summary)
            .await;

        for file in &plan.files_to_delete {
            self.forget_settled(file);
        }
        for dir in &plan.dirs_to_delete {
            self.forget_settled_under(dir);
        }

        summary.files_written.sort();
        summary.files_copied.sort();
        summary.files_deleted.sort();
        summary.dirs_deleted.sort();
        summary.dirs_added.sort();

        tracing::debug!(
            written = summary.files_written.len(),
            copied = summary.files_copied.len(),
            deleted = summary.files_deleted.len() + summary.dirs_deleted.len(),
            added = summary.dirs_added.len(),
            failures = summary.failures.len(),
            "commit finished"
        );
        summary
    }

    async fn commit_ensure_dirs(&self, dirs: &[PathBuf], summary: &mut CommitSummary) {
        for level in depth_levels(dirs) {
            let results = join_all(
                level
                    .iter()
                    .map(|dir| async move { (dir, self.disk.mkdir(dir).await) }),
            )
            .await;

            for (dir, result) in results {
                match result {
                    Ok(()) => {
                        self.learn_committed(dir, EntryKind::Directory);
                        summary.dirs_added.push(dir.clone());
                    }
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        self.learn_committed(dir, EntryKind::Directory);
                    }
                    Err(e) => {
                        self.forget_settled(dir);
                        summary.failures.push(failure(CommitOp::EnsureDir, dir, &e));
                    }
                }
            }
        }
    }

    async fn commit_writes_and_copies(&self, plan: &CommitPlan, summary: &mut CommitSummary) {
        let writes: Vec<(PathBuf, String)> = {
            let state = self.state();
            plan.files_to_write
                .iter()
                .filter_map(|path| {
                    let text = state.entries.get(path)?.text.clone()?;
                    Some((path.clone(), text))
                })
                .collect()
        };

        let (written, copied) = futures::join!(
            join_all(writes.iter().map(|(path, text)| async move {
                (path, self.disk.write(path, text.as_bytes()).await)
            })),
            join_all(plan.copy_tasks.iter().map(|task| async move {
                (
                    task,
                    self.disk
                        .copy_file(&task.source, &task.destination)
                        .await,
                )
            })),
        );

        for (path, result) in written {
            match result {
                Ok(()) => summary.files_written.push(path.clone()),
                Err(e) => {
                    summary.failures.push(failure(CommitOp::WriteFile, path, &e));
                    // next write of this path must not be skipped as identical
                    self.forget_settled(path);
                }
            }
        }

        for (task, result) in copied {
            match result {
                Ok(()) => {
                    self.learn_committed(&task.destination, EntryKind::File);
                    summary.files_copied.push(task.destination.clone());
                }
                Err(e) => summary
                    .failures
                    .push(failure(CommitOp::CopyFile, &task.destination, &e)),
            }
        }
    }

    async fn commit_delete_files(&self, files: &[PathBuf], summary: &mut CommitSummary) {
        let results = join_all(
            files
                .iter()
                .map(|file| async move { (file, self.disk.remove_file(file).await) }),
        )
        .await;

        for (file, result) in results {
            match result {
                Ok(()) => summary.files_deleted.push(file.clone()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => summary.failures.push(failure(CommitOp::DeleteFile, file, &e)),
            }
        }
    }

    async fn commit_delete_dirs(&self, dirs: &[PathBuf], summary: &mut CommitSummary) {
        for level in depth_levels(dirs) {
            let results = join_all(
                level
                    .iter()
                    .map(|dir| async move { (dir, self.disk.remove_dir(dir).await) }),
            )
            .await;

            for (dir, result) in results {
                match result {
                    Ok(()) => summary.dirs_deleted.push(dir.clone()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => summary.failures.push(failure(CommitOp::DeleteDir, dir, &e)),
                }
            }
        }
    }

    fn learn_committed(&self, path: &Path, kind: EntryKind) {
        let mut state = self.state();
        let entry = state.entries.entry(path.to_path_buf()).or_default();
        if entry.pending == PendingOp::None {
            entry.exists = Some(true);
            entry.kind = Some(kind);
        }
    }

    /// Drop an entry unless something new was queued for it meanwhile.
    fn forget_settled(&self, path: &Path) {
        let mut state = self.state();
        if state
            .entries
            .get(path)
            .is_some_and(|e| e.pending == PendingOp::None)
        {
            state.entries.remove(path);
        }
    }

    fn forget_settled_under(&self, dir: &Path) {
        self.state()
            .entries
            .retain(|path, entry| entry.pending != PendingOp::None || !paths::is_within(dir, path));
    }

    // ---------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------

    /// Drop the cache entry for one path, pending operation included.
    pub fn clear_file_cache(&self, path: impl AsRef<Path>) {
        let path = paths::normalize(path);
        self.state().entries.remove(&path);
    }

    /// Drop every cache entry at or beneath a directory.
    ///
    /// Containment is component-wise: clearing `/a` leaves `/ab` alone.
    pub fn clear_dir_cache(&self, path: impl AsRef<Path>) {
        let dir = paths::normalize(path);
        self.state()
            .entries
            .retain(|path, _| !paths::is_within(&dir, path));
    }

    /// Drop the whole cache and every queued copy.
    pub fn clear_cache(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.copy_tasks.clear();
    }
}
