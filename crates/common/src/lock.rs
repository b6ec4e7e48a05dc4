//! Cross-process advisory locks bound to `<target>.lock`
//!
//! Locks are per target path: wrapping `npm` and `tsc` at the same time never
//! contends. A lock is held for as long as the [`FileLock`] value lives.

use fs2::FileExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::{env_vars, lock_path};

/// Timeout used by install/uninstall and registry updates.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("timed out after {timeout:?} waiting for lock {} (another ribbin process may be busy; retry)", path.display())]
    Timeout { path: PathBuf, timeout: Duration },
    #[error("failed to lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Exclusive,
    Shared,
}

/// Held advisory lock. Released on [`FileLock::release`] or drop.
#[derive(Debug)]
pub struct FileLock {
    file: Option<File>,
    path: PathBuf,
    mode: LockMode,
}

impl FileLock {
    /// Take an exclusive lock on `target`, waiting at most `timeout`.
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire_with(target, timeout, LockMode::Exclusive)
    }

    /// Take a shared lock on `target`, waiting at most `timeout`.
    pub fn acquire_shared(target: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire_with(target, timeout, LockMode::Shared)
    }

    fn acquire_with(target: &Path, timeout: Duration, mode: LockMode) -> Result<Self, LockError> {
        let path = lock_path(target);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        let start = Instant::now();
        loop {
            let file = fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|source| LockError::Io {
                    path: path.clone(),
                    source,
                })?;

            let attempt = match mode {
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
                LockMode::Shared => FileExt::try_lock_shared(&file),
            };

            match attempt {
                Ok(()) => {
                    // A releasing holder may have unlinked the file we locked.
                    if still_names(&file, &path) {
                        log::debug!("acquired {mode:?} lock {}", path.display());
                        return Ok(Self {
                            file: Some(file),
                            path,
                            mode,
                        });
                    }
                    let _ = FileExt::unlock(&file);
                }
                Err(e) if is_contended(&e) => {}
                Err(source) => return Err(LockError::Io { path, source }),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout { path, timeout });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Path of the lock file itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Unlock, close and best-effort remove the lock file.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LockError> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        // Only unlink while nobody else can be holding the same inode.
        let exclusive_now = match self.mode {
            LockMode::Exclusive => true,
            LockMode::Shared => FileExt::try_lock_exclusive(&file).is_ok(),
        };
        if exclusive_now {
            let _ = fs::remove_file(&self.path);
        }

        FileExt::unlock(&file).map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            log::debug!("lock release failed: {e}");
        }
    }
}

/// Run `f` while holding an exclusive lock on `target`.
pub fn with_lock<T, E, F>(target: &Path, timeout: Duration, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<LockError>,
{
    let lock = FileLock::acquire(target, timeout)?;
    let result = f();
    drop(lock);
    result
}

/// Run `f` while holding a shared lock on `target`.
pub fn with_shared_lock<T, E, F>(target: &Path, timeout: Duration, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<LockError>,
{
    let lock = FileLock::acquire_shared(target, timeout)?;
    let result = f();
    drop(lock);
    result
}

/// Lock timeout, honoring `RIBBIN_LOCK_TIMEOUT_MS`.
pub fn lock_timeout() -> Duration {
    std::env::var(env_vars::LOCK_TIMEOUT_MS)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_LOCK_TIMEOUT)
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn still_names(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_names(_file: &File, path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_exclusive_lock_blocks_second_holder() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("npm");

        let first = FileLock::acquire(&target, Duration::from_secs(1)).unwrap();
        let second = FileLock::acquire(&target, Duration::from_millis(150));
        assert!(matches!(second, Err(LockError::Timeout { .. })));

        first.release().unwrap();
        let third = FileLock::acquire(&target, Duration::from_secs(1));
        assert!(third.is_ok());
    }

    #[test]
    fn test_shared_locks_coexist() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("registry.json");

        let a = FileLock::acquire_shared(&target, Duration::from_secs(1)).unwrap();
        let b = FileLock::acquire_shared(&target, Duration::from_secs(1)).unwrap();
        assert_eq!(a.mode(), LockMode::Shared);
        assert_eq!(b.mode(), LockMode::Shared);
    }

    #[test]
    fn test_shared_and_exclusive_exclude_each_other() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("tsc");

        let shared = FileLock::acquire_shared(&target, Duration::from_secs(1)).unwrap();
        let exclusive = FileLock::acquire(&target, Duration::from_millis(150));
        assert!(exclusive.unwrap_err().is_timeout());
        drop(shared);

        let exclusive = FileLock::acquire(&target, Duration::from_secs(1)).unwrap();
        let shared = FileLock::acquire_shared(&target, Duration::from_millis(150));
        assert!(shared.unwrap_err().is_timeout());
        drop(exclusive);
    }

    #[test]
    fn test_release_removes_lock_file() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("node");

        let lock = FileLock::acquire(&target, Duration::from_secs(1)).unwrap();
        let lock_file = lock.path().to_path_buf();
        assert!(lock_file.exists());
        lock.release().unwrap();
        assert!(!lock_file.exists());
    }

    #[test]
    fn test_shared_release_keeps_file_while_others_hold_it() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("registry.json");

        let a = FileLock::acquire_shared(&target, Duration::from_secs(1)).unwrap();
        let b = FileLock::acquire_shared(&target, Duration::from_secs(1)).unwrap();
        let lock_file = a.path().to_path_buf();
        a.release().unwrap();
        assert!(lock_file.exists());

        // The remaining shared holder still excludes writers.
        assert!(FileLock::acquire(&target, Duration::from_millis(150)).is_err());
        b.release().unwrap();
        assert!(!lock_file.exists());
    }

    #[test]
    fn test_concurrent_exclusive_locks_serialize() {
        let temp = TempDir::new().unwrap();
        let target = Arc::new(temp.path().join("cargo"));
        let barrier = Arc::new(Barrier::new(4));
        let (tx, rx) = mpsc::channel();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let target = Arc::clone(&target);
                let barrier = Arc::clone(&barrier);
                let tx = tx.clone();
                thread::spawn(move || {
                    barrier.wait();
                    with_lock::<_, LockError, _>(&target, Duration::from_secs(10), || {
                        tx.send((i, "enter")).unwrap();
                        thread::sleep(Duration::from_millis(30));
                        tx.send((i, "exit")).unwrap();
                        Ok(())
                    })
                    .unwrap();
                })
            })
            .collect();
        drop(tx);
        for handle in handles {
            handle.join().unwrap();
        }

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 8);
        for pair in events.chunks(2) {
            assert_eq!(pair[0].0, pair[1].0, "critical sections interleaved");
            assert_eq!(pair[0].1, "enter");
            assert_eq!(pair[1].1, "exit");
        }
    }

    #[test]
    fn test_with_lock_releases_on_error() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("pnpm");

        #[derive(Debug)]
        struct Failed;
        impl From<LockError> for Failed {
            fn from(_: LockError) -> Self {
                Failed
            }
        }

        let result: Result<(), Failed> =
            with_lock(&target, Duration::from_secs(1), || Err(Failed));
        assert!(result.is_err());
        assert!(FileLock::acquire(&target, Duration::from_millis(100)).is_ok());
    }
}
