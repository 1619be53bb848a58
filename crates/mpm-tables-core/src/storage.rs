//! Local filesystem helpers.
//!
//! Every write that produces a durable artifact (output tables, manifest,
//! cache blob) goes through write-then-rename so readers never observe a
//! half-written file at the final path. Errors carry the offending path.

mod sink;

pub use sink::{OutputSink, StagedFile};

use snafu::{Backtrace, IntoError, prelude::*};
use std::{
    error::Error,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by the storage backend implementation.
///
/// Only the local filesystem is supported; its I/O errors are wrapped so
/// [`StorageError`] variants can add path context.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// An I/O error occurred on the local filesystem.
    #[snafu(display("Local I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend I/O error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// Whether the error reports a missing path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Wrap an I/O error with its path, distinguishing missing paths.
pub(crate) fn io_error(path: &Path, e: io::Error) -> StorageError {
    let path = path.display().to_string();
    if e.kind() == io::ErrorKind::NotFound {
        NotFoundSnafu { path }.into_error(BackendError::Local(e))
    } else {
        OtherIoSnafu { path }.into_error(BackendError::Local(e))
    }
}

/// Create `dir` and all missing parents.
pub fn create_dir_all(dir: &Path) -> StorageResult<()> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))
}

fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    match abs.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Whether `path` exists. Permission and other errors are surfaced.
pub fn exists(path: &Path) -> StorageResult<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Read a whole file into memory.
pub fn read_all_bytes(path: &Path) -> StorageResult<Vec<u8>> {
    fs::read(path).map_err(|e| io_error(path, e))
}

/// Read a whole file as UTF-8 text.
pub fn read_to_string(path: &Path) -> StorageResult<String> {
    fs::read_to_string(path).map_err(|e| io_error(path, e))
}

/// Remove `path`, treating an already absent file as success.
pub fn remove_file_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Guard that removes a temporary file on drop unless disarmed.
/// Used to ensure cleanup on error paths during atomic writes.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Disarm the guard so the file is NOT removed on drop.
    /// Call this after a successful rename.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup; we are likely already handling another error.
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn temp_path_for(abs: &Path) -> PathBuf {
    let mut name = abs
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    abs.with_file_name(name)
}

/// Write `contents` to `path` using write, fsync, then rename.
///
/// The parent directory is created when missing.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    create_parent_dir(path)?;

    let tmp_path = temp_path_for(path);
    let mut guard = TempFileGuard::new(tmp_path.clone());

    {
        let mut file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
        file.write_all(contents)
            .map_err(|e| io_error(&tmp_path, e))?;
        file.sync_all().map_err(|e| io_error(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;

    // Success - the temp file has been renamed.
    guard.disarm();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_creates_parents_and_overwrites() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("nested/dir/blob.bin");

        write_atomic(&path, b"first").expect("first write");
        write_atomic(&path, b"second").expect("overwrite");

        assert_eq!(read_all_bytes(&path).expect("read"), b"second");
        assert!(!exists(&temp_path_for(&path)).expect("stat tmp"));
    }

    #[test]
    fn read_missing_reports_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let err = read_all_bytes(&tmp.path().join("missing.bin")).expect_err("missing");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("missing.bin"));
    }

    #[test]
    fn remove_file_if_exists_tolerates_absence() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("gone.json");
        remove_file_if_exists(&path).expect("absent ok");

        std::fs::write(&path, b"{}").expect("write");
        remove_file_if_exists(&path).expect("remove");
        assert!(!exists(&path).expect("stat"));
    }
}
