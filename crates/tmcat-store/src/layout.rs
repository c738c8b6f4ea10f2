use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-repository configuration directory under the root.
pub const REPO_CONF_DIR: &str = ".tmc";
/// Name of the table-of-contents file inside [`REPO_CONF_DIR`].
pub const TOC_FILENAME: &str = "toc.json";
/// Name of the sorted names file inside [`REPO_CONF_DIR`].
pub const NAMES_FILENAME: &str = "tmnames.txt";

/// Directory layout of a filesystem repository rooted at some directory.
///
/// TM files live under `<root>/<id>`; index state lives in `<root>/.tmc/`.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn conf_dir(&self) -> PathBuf {
        self.root.join(REPO_CONF_DIR)
    }

    #[inline]
    pub fn toc_file(&self) -> PathBuf {
        self.conf_dir().join(TOC_FILENAME)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.conf_dir().join(format!("{TOC_FILENAME}.lock"))
    }

    #[inline]
    pub fn names_file(&self) -> PathBuf {
        self.conf_dir().join(NAMES_FILENAME)
    }

    /// Absolute path of the TM file stored under `id`.
    #[inline]
    pub fn tm_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// The repository root must exist and be a directory.
    pub fn check_root_valid(&self) -> Result<(), StoreError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(StoreError::RootInvalid(
                self.root.to_string_lossy().into_owned(),
            )),
        }
    }

    /// Move a pre-`.tmc` ToC file from the root into the configuration
    /// directory and drop its stale lock file. Called with the ToC lock
    /// held; all errors are ignored.
    pub fn migrate_legacy_toc(&self) {
        let old_toc = self.root.join(TOC_FILENAME);
        if old_toc.is_file() && !self.toc_file().exists() {
            let _ = fs::rename(&old_toc, self.toc_file());
        }
        let _ = fs::remove_file(self.root.join(format!("{TOC_FILENAME}.lock")));
    }
}
