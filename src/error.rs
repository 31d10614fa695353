//! Error taxonomy for tailing the watched file.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure reported by [`TailReader`](crate::TailReader).
///
/// `FileNotFound` and `PermissionDenied` are transient: the file may come back
/// or have its permissions restored, so the monitor retries them on a timer.
/// Anything else is surfaced as `Io`.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("log file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("permission denied reading log file: {0}")]
    PermissionDenied(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TailError {
    /// Classifies an `io::Error` raised while touching `path`.
    pub fn from_io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => TailError::FileNotFound(path),
            io::ErrorKind::PermissionDenied => TailError::PermissionDenied(path),
            _ => TailError::Io { path, source: err },
        }
    }

    /// Returns `true` if the condition should be handled by re-opening the file.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TailError::FileNotFound(_) | TailError::PermissionDenied(_)
        )
    }

    pub fn path(&self) -> &Path {
        match self {
            TailError::FileNotFound(path) | TailError::PermissionDenied(path) => path,
            TailError::Io { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_kinds() {
        let not_found = TailError::from_io("/a.log", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(not_found, TailError::FileNotFound(_)));
        assert!(not_found.is_transient());

        let denied =
            TailError::from_io("/a.log", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, TailError::PermissionDenied(_)));
        assert!(denied.is_transient());

        let other = TailError::from_io("/a.log", io::Error::from(io::ErrorKind::InvalidData));
        assert!(!other.is_transient());
        assert_eq!(other.path(), Path::new("/a.log"));
    }
}
