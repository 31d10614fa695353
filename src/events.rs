//! Filesystem change notifications for a single watched path.
//!
//! The watch is registered on the parent directory rather than on the file
//! itself, so that events keep flowing when the file is deleted, rotated away
//! or recreated under the same name.

use std::fmt::{self, Debug, Formatter};
use std::io;
use std::path::{Path, PathBuf};

use notify::Watcher;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to start watcher: {0}")]
    Start(#[source] notify::Error),
    #[error("Failed to add path to watch: {0}")]
    AddFailure(#[source] notify::Error),
    #[error("Invalid watch path: {0}")]
    Path(#[from] io::Error),
}

/// Wakes a reader whenever something happens to the watched path.
///
/// Events for other entries of the parent directory are dropped inside the
/// watcher callback, and wakes coalesce: however many events arrive while
/// nobody is waiting, at most one is kept.
pub struct FileEvents {
    _inner: notify::RecommendedWatcher,
    path: PathBuf,
    wakes: mpsc::Receiver<()>,
}

impl Debug for FileEvents {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("FileEvents")
            .field("path", &self.path)
            .finish()
    }
}

impl FileEvents {
    /// Starts watching the directory containing `path`. The file itself need
    /// not exist, but its parent directory must.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = absolutify(path)?;
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File needs a parent directory"))?
            .to_path_buf();

        let (tx, rx) = mpsc::channel(1);
        let watched = path.clone();
        let mut inner = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) if concerns(&watched, &event) => {
                    // Full means a wake is already pending; closed means the
                    // owning `FileEvents` is being dropped.
                    let _ = tx.try_send(());
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(path = %watched.display(), error = %e, "watch error");
                }
            }
        })
        .map_err(Error::Start)?;

        inner
            .watch(&parent, notify::RecursiveMode::NonRecursive)
            .map_err(Error::AddFailure)?;

        Ok(FileEvents {
            _inner: inner,
            path,
            wakes: rx,
        })
    }

    /// Waits until something has happened to the watched path since the last
    /// call.
    ///
    /// Returns `None` if the underlying watcher has shut down, in which case
    /// the caller should fall back to polling.
    pub async fn changed(&mut self) -> Option<()> {
        self.wakes.recv().await
    }
}

fn concerns(path: &Path, event: &notify::Event) -> bool {
    match event.kind {
        notify::EventKind::Access(_) => false,
        _ => event.paths.iter().any(|p| p == path),
    }
}

/// Resolves `path` against the current directory and canonicalizes its parent,
/// leaving the file name untouched so nonexistent files can still be watched.
fn absolutify(path: impl Into<PathBuf>) -> io::Result<PathBuf> {
    let path = path.into();

    let parent = match path.parent() {
        None => std::env::current_dir()?,
        Some(parent) if parent == Path::new("") => std::env::current_dir()?,
        Some(parent) => parent.to_path_buf(),
    };
    let filename = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Filename not found in path"))?
        .to_os_string();

    let parent = parent.canonicalize().unwrap_or(parent);

    Ok(parent.join(filename))
}
