use crate::layout::RepoLayout;
use crate::StoreError;
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, TryLockError};
use std::time::{Duration, Instant};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(13);

/// Advisory lock on a repository's ToC, held for the duration of any index
/// read or write.
///
/// Two layers: a per-path in-process mutex serializes threads of this
/// process, then an OS file lock on `.tmc/toc.json.lock` serializes against
/// other processes (the CLI and the server run independently). Acquisition
/// polls every 13 ms and gives up after 5 s with [`StoreError::TocLocked`].
pub struct TocLock {
    _process: MutexGuard<'static, ()>,
    file: File,
}

/// In-process mutex for a lock-file path. Mutexes are leaked so guards can
/// be stored with a `'static` lifetime; the set of distinct repository
/// roots per process is small.
fn process_mutex(path: &Path) -> &'static Mutex<()> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, &'static Mutex<()>>>> = OnceLock::new();
    let mut map = LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *map.entry(path.to_path_buf())
        .or_insert_with(|| Box::leak(Box::new(Mutex::new(()))))
}

impl TocLock {
    /// Acquire the lock for a repository, creating the configuration
    /// directory on demand. Runs the legacy ToC migration before returning.
    pub fn acquire(layout: &RepoLayout) -> Result<Self, StoreError> {
        Self::acquire_with_timeout(layout, LOCK_TIMEOUT)
    }

    fn acquire_with_timeout(layout: &RepoLayout, timeout: Duration) -> Result<Self, StoreError> {
        let conf_dir = layout.conf_dir();
        if !conf_dir.is_dir() {
            std::fs::create_dir_all(&conf_dir)?;
        }
        let lock_path = layout.lock_file();
        let deadline = Instant::now() + timeout;

        let mutex = process_mutex(&lock_path);
        let process = loop {
            match mutex.try_lock() {
                Ok(guard) => break guard,
                Err(TryLockError::Poisoned(poisoned)) => break poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::TocLocked);
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
            }
        };

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(_) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::TocLocked);
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
            }
        }

        layout.migrate_legacy_toc();

        Ok(Self {
            _process: process,
            file,
        })
    }
}

impl Drop for TocLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!("failed to release ToC lock: {e}");
        }
    }
}
