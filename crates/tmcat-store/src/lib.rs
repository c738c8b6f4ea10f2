//! Storage layer for filesystem-backed tmcat repositories.
//!
//! This crate owns the on-disk shape of a repository root: the `.tmc/`
//! configuration directory with the ToC, names file, and lock file
//! (`RepoLayout`), the cross-process advisory lock guarding every ToC access
//! (`TocLock`), and atomic read/write helpers for the index files.

pub mod files;
pub mod layout;
pub mod lock;

pub use files::{atomic_write, read_names, read_toc, write_names, write_toc};
pub use layout::{RepoLayout, NAMES_FILENAME, REPO_CONF_DIR, TOC_FILENAME};
pub use lock::TocLock;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not acquire lock on ToC file")]
    TocLocked,
    #[error("{0}: root is not a directory")]
    RootInvalid(String),
    #[error("no table of contents found; rebuild the index for this repository")]
    NoToc,
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
