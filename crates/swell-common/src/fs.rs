//! File-system abstractions.
//!
//! This crate uses a narrow `FileSystem` trait to allow unit tests to inject
//! fake implementations without touching the real disk. Only the operations
//! the context-budget monitor and snapshot rotation need are included.

use std::io;
use std::path::{Path, PathBuf};

/// A minimal file-system interface.
///
/// Prefer accepting a `&dyn FileSystem` in code that probes file metadata so
/// it can be tested without relying on `std::fs`.
pub trait FileSystem: Send + Sync {
    /// Return `true` if `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Return the byte size of the file at `path`, or `None` when absent.
    fn file_size(&self, path: &Path) -> Option<u64>;

    /// Read the entire file at `path` into a UTF-8 string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Return the immediate children of `path`.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
/// A `FileSystem` backed by the standard library's `std::fs`.
pub struct StdFs;

impl FileSystem for StdFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            out.push(entry.path());
        }
        Ok(out)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}
