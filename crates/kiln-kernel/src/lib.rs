//! kiln-kernel: the core of the kiln incremental build engine.
//!
//! This crate provides:
//!
//! - **VFS**: a transactional overlay that caches reads and batches writes,
//!   deletes and copies into one ordered commit
//! - **Build control**: generation ids, cooperative abort, full vs
//!   incremental rebuild decisions
//! - **Reporting**: build results and build/rebuild events
//!
//! Compile steps themselves (transpiling, bundling, styles) live outside
//! this crate and talk to it through [`vfs::Vfs`] and
//! [`build::BuildContext`].

pub mod build;
pub mod config;
pub mod error;
pub mod vfs;

pub use build::{BuildContext, BuildController, BuildEvent, BuildStatus, WatcherResults};
pub use config::BuildConfig;
pub use error::{ConfigError, VfsError};
pub use kiln_types;
pub use vfs::{CopyOptions, Filesystem, LocalFs, MemoryFs, Vfs, WriteOptions};
