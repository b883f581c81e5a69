//! Advisory file-lock primitives.
//!
//! Two lock shapes cover every cross-process coordination need in the
//! workspace:
//!
//! - [`LockedFile`]: a scoped shared/exclusive lock around a read or write,
//!   released on all exit paths (drop unlocks).
//! - [`SingletonLock`]: a process-lifetime exclusive lock that prevents a
//!   second instance of a daemon from starting.
//!
//! Acquisition is bounded: callers pass a timeout and get
//! [`LockError::Timeout`] on exhaustion rather than blocking forever.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

/// Interval between lock acquisition attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Failure modes for lock acquisition.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock could not be acquired within the configured timeout.
    #[error("timed out after {timeout:?} waiting for lock on {path}")]
    Timeout {
        /// Lock file path.
        path: PathBuf,
        /// Timeout that was exhausted.
        timeout: Duration,
    },
    /// Opening or locking the file failed for an I/O reason.
    #[error("lock I/O failure on {path}: {source}")]
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Another instance already holds the singleton lock.
    #[error("another instance already holds {path}")]
    AlreadyHeld {
        /// Lock file path.
        path: PathBuf,
    },
}

/// Lock acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared lock; many readers may hold it concurrently.
    Shared,
    /// Exclusive lock; a single writer.
    Exclusive,
}

/// A scoped advisory lock on a file.
///
/// The lock is released when the value is dropped. The locked file is a
/// dedicated sidecar (callers use [`crate::paths`] helpers), never the
/// document itself, so atomic renames of the document do not invalidate the
/// lock.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    /// Acquire a lock on `path` in `mode`, waiting up to `timeout`.
    pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<Self, LockError> {
        let file = open_lock_file(path)?;
        let started = Instant::now();
        loop {
            // Fully-qualified: std 1.89 grew inherent `File::try_lock*`
            // methods with a different return type.
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(source) => {
                    return Err(LockError::Io {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
            if started.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    timeout,
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }

    /// Shorthand for an exclusive acquisition.
    pub fn exclusive(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(path, LockMode::Exclusive, timeout)
    }

    /// Shorthand for a shared acquisition.
    pub fn shared(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Self::acquire(path, LockMode::Shared, timeout)
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// A process-lifetime exclusive lock used to enforce a single daemon
/// instance.
///
/// The holder's PID is written into the lock file so an operator (or the
/// `stop` command) can find the live instance. The lock is released on drop;
/// the file itself is left behind, which is harmless; the next holder
/// truncates it.
#[derive(Debug)]
pub struct SingletonLock {
    file: File,
    path: PathBuf,
}

impl SingletonLock {
    /// Try to acquire the singleton lock at `path` without waiting.
    ///
    /// Fails with [`LockError::AlreadyHeld`] when another live process holds
    /// the lock.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = open_lock_file(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Err(LockError::AlreadyHeld {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(LockError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        file.set_len(0).map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let pid = std::process::id();
        use std::io::Write as _;
        let mut f = &file;
        write!(f, "{pid}").map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        f.flush().map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Read the PID recorded in a singleton lock file, if any.
    ///
    /// This does not tell whether the lock is currently held; callers probe
    /// liveness separately.
    pub fn read_pid(path: &Path) -> Option<u32> {
        let raw = std::fs::read_to_string(path).ok()?;
        raw.trim().parse().ok()
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SingletonLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })
}
