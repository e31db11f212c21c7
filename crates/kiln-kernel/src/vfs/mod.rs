//! Transactional virtual filesystem.
//!
//! Compilation steps read and write through a [`Vfs`] overlay instead of the
//! disk. The overlay caches what it has learned about each path and queues
//! every mutation; nothing reaches the disk until [`Vfs::commit`].
//!
//! - **Vfs**: the overlay (cache + pending operations + commit)
//! - **CommitPlan**: pure planner turning pending operations into ordered
//!   disk instructions
//! - **Filesystem**: the disk adapter trait the overlay commits to
//! - **LocalFs**: real disk, rooted at a directory
//! - **MemoryFs**: strict in-memory disk with a call journal, for tests
//!
//! # Design
//!
//! ```text
//!   compile steps ──read/write──▶ Vfs (cache, pending ops, copy tasks)
//!                                   │
//!                                   │ commit(): CommitPlan::build
//!                                   ▼
//!                        ensure dirs → write ∥ copy → delete files → delete dirs
//!                                   │
//!                                   ▼
//!                           dyn Filesystem (LocalFs, MemoryFs)
//! ```
//!
//! All paths are normalized by [`paths::normalize`] on entry, so `a/b`,
//! `/a/./b/` and `/a/c/../b` share one cache entry.

mod cache;
mod local;
mod memory;
mod overlay;
pub mod paths;
mod plan;
mod traits;

pub use cache::{CacheEntry, CopyTask, OverlayCache, PendingOp};
pub use local::LocalFs;
pub use memory::{DiskOp, MemoryFs};
pub use overlay::{CopyFilter, CopyOptions, Vfs, WriteOptions};
pub use plan::CommitPlan;
pub use traits::{DirEntry, EntryKind, Filesystem};
