//! Everything related to reading newly appended lines from the watched file.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{metadata, File};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::Instant;

use crate::error::TailError;
use crate::events::FileEvents;

/// How often the file is re-checked when no filesystem event arrives.
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Result of waiting for the next line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NextLine {
    /// A complete line, without its terminator.
    Line(String),
    /// The timeout elapsed before a complete line was written.
    NoNewData,
}

/// Device and inode of an open file, used to notice when the path starts
/// pointing at a different file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(FileIdentity {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Open handle plus read position for the watched file.
///
/// `offset` always points just past the last line handed out. Bytes read
/// beyond it that are not yet terminated by a newline sit in `partial`, so
/// the handle's own position is `offset + partial.len()`.
struct TailState {
    reader: BufReader<File>,
    offset: u64,
    partial: Vec<u8>,
    identity: Option<FileIdentity>,
}

impl TailState {
    async fn open_at_end(path: &Path) -> Result<Self, TailError> {
        let mut file = File::open(path)
            .await
            .map_err(|e| TailError::from_io(path, e))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| TailError::from_io(path, e))?;

        if meta.is_dir() {
            return Err(TailError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "path is a directory"),
            });
        }

        let size = meta.len();
        file.seek(io::SeekFrom::Start(size))
            .await
            .map_err(|e| TailError::from_io(path, e))?;

        Ok(TailState {
            reader: BufReader::new(file),
            offset: size,
            partial: Vec::new(),
            identity: FileIdentity::of(&meta),
        })
    }

    fn consumed(&self) -> u64 {
        self.offset + self.partial.len() as u64
    }
}

/// Tails a single file, handing out only complete lines appended after it
/// was opened.
///
/// Truncation (the file shrinking below what has been read) and replacement
/// (the path now naming a different file) are recovered from by re-opening
/// the path at its current end. A missing or unreadable file is reported as a
/// transient [`TailError`]; the caller decides when to [`reopen`](Self::reopen).
pub struct TailReader {
    path: PathBuf,
    state: TailState,
    events: Option<FileEvents>,
    recheck: Duration,
}

impl fmt::Debug for TailReader {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("TailReader")
            .field("path", &self.path)
            .field("offset", &self.state.offset)
            .field("partial_len", &self.state.partial.len())
            .field("watching", &self.events.is_some())
            .finish()
    }
}

impl TailReader {
    /// Opens `path` and seeks to its end. Nothing written before this call is
    /// ever returned.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TailError> {
        let path = path.into();
        let state = TailState::open_at_end(&path).await?;

        let events = match FileEvents::new(&path) {
            Ok(events) => Some(events),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "filesystem notifications unavailable, falling back to polling"
                );
                None
            }
        };

        tracing::debug!(path = %path.display(), offset = state.offset, "opened log file");

        Ok(TailReader {
            path,
            state,
            events,
            recheck: DEFAULT_RECHECK_INTERVAL,
        })
    }

    /// Sets how often the file is re-checked while waiting for data.
    pub fn with_recheck_interval(mut self, recheck: Duration) -> Self {
        self.recheck = recheck;
        self
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Byte position just past the last line returned.
    pub fn offset(&self) -> u64 {
        self.state.offset
    }

    /// Re-opens the path at its current end, discarding any held partial line.
    pub async fn reopen(&mut self) -> Result<(), TailError> {
        self.state = TailState::open_at_end(&self.path).await?;
        tracing::info!(path = %self.path.display(), offset = self.state.offset, "reopened log file");
        Ok(())
    }

    /// Waits up to `timeout` for the next complete line.
    ///
    /// An unterminated trailing line is held back and joined with whatever is
    /// appended to it later.
    pub async fn next_line(&mut self, timeout: Duration) -> Result<NextLine, TailError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(line) = self.read_line().await? {
                return Ok(NextLine::Line(line));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(NextLine::NoNewData);
            }

            self.wait_for_change(self.recheck.min(deadline - now)).await;
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>, TailError> {
        self.check_rotation().await?;

        let state = &mut self.state;
        state
            .reader
            .read_until(b'\n', &mut state.partial)
            .await
            .map_err(|e| TailError::from_io(&self.path, e))?;

        if state.partial.last() != Some(&b'\n') {
            return Ok(None);
        }

        let raw = std::mem::take(&mut state.partial);
        state.offset += raw.len() as u64;

        Ok(Some(decode_line(raw)))
    }

    async fn check_rotation(&mut self) -> Result<(), TailError> {
        let meta = metadata(&self.path)
            .await
            .map_err(|e| TailError::from_io(&self.path, e))?;

        let replaced = match (self.state.identity, FileIdentity::of(&meta)) {
            (Some(old), Some(new)) => old != new,
            _ => false,
        };
        let truncated = meta.len() < self.state.consumed();

        if replaced || truncated {
            tracing::warn!(
                path = %self.path.display(),
                size = meta.len(),
                offset = self.state.consumed(),
                replaced,
                "log file truncated or replaced, resuming from its current end"
            );
            self.state = TailState::open_at_end(&self.path).await?;
        }

        Ok(())
    }

    async fn wait_for_change(&mut self, wait: Duration) {
        let closed = match self.events.as_mut() {
            Some(events) => tokio::select! {
                changed = events.changed() => changed.is_none(),
                _ = tokio::time::sleep(wait) => false,
            },
            None => {
                tokio::time::sleep(wait).await;
                false
            }
        };

        if closed {
            tracing::warn!(path = %self.path.display(), "file watcher stopped, falling back to polling");
            self.events = None;
        }
    }
}

fn decode_line(mut raw: Vec<u8>) -> String {
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }

    match String::from_utf8(raw) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
