//! Filesystem access used by discovery and export resolution.
//!
//! Both walks only ever need three operations: list a directory, read a
//! manifest, and resolve a realpath. They go through [`PackageFs`] so the
//! walks can run against an in-memory tree in tests.

#[cfg(test)]
pub(crate) mod memory;

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

/// Asynchronous filesystem operations needed by the resolver.
pub trait PackageFs: Send + Sync + 'static {
    /// List the entry names of a directory.
    fn read_dir(&self, path: &Path) -> impl Future<Output = io::Result<Vec<OsString>>> + Send;

    /// Read a UTF-8 file.
    fn read_to_string(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send;

    /// Resolve every symlink in `path`.
    fn canonicalize(&self, path: &Path) -> impl Future<Output = io::Result<PathBuf>> + Send;
}

/// [`PackageFs`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

impl PackageFs for TokioFs {
    fn read_dir(&self, path: &Path) -> impl Future<Output = io::Result<Vec<OsString>>> + Send {
        let path = path.to_path_buf();
        async move {
            let mut entries = tokio::fs::read_dir(&path).await?;
            let mut names = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                names.push(entry.file_name());
            }
            Ok(names)
        }
    }

    fn read_to_string(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::read_to_string(&path).await }
    }

    fn canonicalize(&self, path: &Path) -> impl Future<Output = io::Result<PathBuf>> + Send {
        let path = path.to_path_buf();
        async move {
            let resolved = tokio::fs::canonicalize(&path).await?;
            // Avoid `\\?\` verbatim prefixes on Windows.
            Ok(dunce::simplified(&resolved).to_path_buf())
        }
    }
}

/// Whether an I/O error means "nothing here" rather than a real failure.
///
/// Missing paths, paths of the wrong kind (a file where a directory was
/// expected, or the reverse) and symlink loops are normal in a dependency
/// tree. A loop resolves to nothing, like a dangling link.
#[must_use]
pub fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory | io::ErrorKind::IsADirectory
    ) || is_symlink_loop(err)
}

#[cfg(unix)]
fn is_symlink_loop(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ELOOP)
}

#[cfg(not(unix))]
fn is_symlink_loop(_err: &io::Error) -> bool {
    false
}

/// Map absence to `Ok(None)`, keeping every other error.
pub(crate) fn absent_as_none<T>(result: io::Result<T>) -> io::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_absent(&err) => Ok(None),
        Err(err) => Err(err),
    }
}
