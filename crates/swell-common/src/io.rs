//! Convenience wrappers around `std::fs`.
//!
//! Every persistent store in the workspace writes through [`atomic_replace`]
//! so a crash mid-write can never leave a half-written document behind: the
//! content lands in a `.tmp` sibling first and the rename is the commit.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Read the entire file at `path` into a UTF-8 string.
pub fn read_to_string(path: &Path) -> io::Result<String> {
    fs::read_to_string(path)
}

/// Write `contents` to `path`, creating or truncating the file.
pub fn write(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    fs::write(path, contents)
}

/// Create all directories needed for `path`.
pub fn create_dir_all(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

/// Path of the temporary sibling used by [`atomic_replace`].
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace the file at `path` with `contents`.
///
/// The contents are written to `<path>.tmp` in the same directory and the
/// temp file is renamed over `path`. Rename is the atomic commit; readers
/// observe either the old document or the new one, never a partial write.
pub fn atomic_replace(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

/// [`atomic_replace`] restricted to owner read/write (0600 on Unix).
///
/// Used for the process registry, which may carry command lines the operator
/// does not want group/world readable.
pub fn atomic_replace_private(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&tmp, path)
}

/// Append `line` (plus a trailing newline) to the file at `path`.
///
/// The file is created when missing. Appends are atomic at the line level on
/// local filesystems via the OS's `O_APPEND` semantics.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    use std::io::Write as _;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

/// Move `path` aside to `<path>.corrupt.<suffix>`, preserving the content.
///
/// Returns the destination path. Used by the stores when a document fails to
/// parse: the evidence is kept, a fresh store starts where safe.
pub fn preserve_aside(path: &Path, suffix: &str) -> io::Result<PathBuf> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt.{suffix}"));
    let dest = path.with_file_name(name);
    fs::rename(path, &dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_replace_creates_parent_and_file() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("doc.json");
        atomic_replace(&path, "{}").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "{}");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn atomic_replace_overwrites_existing_content() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("doc.json");
        atomic_replace(&path, "old").unwrap();
        atomic_replace(&path, "new").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn atomic_replace_private_sets_owner_only_mode() {
        use std::os::unix::fs::PermissionsExt;
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("registry.json");
        atomic_replace_private(&path, "{}").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn append_line_creates_and_appends() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("activity.md");
        append_line(&path, "- first").unwrap();
        append_line(&path, "- second").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "- first\n- second\n");
    }

    #[test]
    fn preserve_aside_moves_file_with_suffix() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("plan.json");
        write(&path, "garbage").unwrap();
        let dest = preserve_aside(&path, "20260801T120000").unwrap();
        assert!(!path.exists());
        assert!(dest.to_string_lossy().contains("plan.json.corrupt."));
        assert_eq!(read_to_string(&dest).unwrap(), "garbage");
    }
}
