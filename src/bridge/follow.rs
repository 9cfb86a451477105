//! Follow an append-only log file from its current end.
//!
//! The file is reopened by path on every read, so rotation (a new file at
//! the same path) is picked up and truncation resets the read offset. A
//! `notify` watcher on the parent directory wakes the follower early; a
//! fixed poll interval covers platforms or filesystems where events are
//! missed.

use std::fs::Metadata;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Upper bound between two reads when no file event arrives.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Streams complete lines appended to a file after it was opened.
pub struct LogFollower {
    path: PathBuf,
    offset: u64,
    /// Device and inode of the file `offset` refers to.
    identity: Option<(u64, u64)>,
    pending: Vec<u8>,
    wake_rx: mpsc::UnboundedReceiver<()>,
    /// Held so `wake_rx` never reports a closed channel.
    _wake_tx: mpsc::UnboundedSender<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl LogFollower {
    /// Start following `path` from its current end.
    ///
    /// Creates the parent directory and an empty file when absent; existing
    /// content is skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be created or inspected.
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Io(format!("failed to create log dir {}: {e}", parent.display()))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::Io(format!("failed to open log {}: {e}", path.display())))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| AppError::Io(format!("failed to stat log {}: {e}", path.display())))?;
        let offset = meta.len();

        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let watcher = spawn_watcher(&path, wake_tx.clone());

        debug!(path = %path.display(), offset, "following log");
        Ok(Self {
            path,
            offset,
            identity: file_identity(&meta),
            pending: Vec::new(),
            wake_rx,
            _wake_tx: wake_tx,
            _watcher: watcher,
        })
    }

    /// Path being followed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until at least one complete new line is available and return
    /// every complete line read, without their terminators.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but cannot be read.
    pub async fn next_lines(&mut self) -> Result<Vec<String>> {
        loop {
            let lines = self.read_new().await?;
            if !lines.is_empty() {
                return Ok(lines);
            }

            tokio::select! {
                _ = self.wake_rx.recv() => {}
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            // Collapse bursts of events into one read.
            while self.wake_rx.try_recv().is_ok() {}
        }
    }

    async fn read_new(&mut self) -> Result<Vec<String>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if self.offset > 0 {
                    debug!(path = %self.path.display(), "log removed, waiting for it to reappear");
                }
                self.reset();
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to open log {}: {err}",
                    self.path.display()
                )))
            }
        };

        let meta = file
            .metadata()
            .await
            .map_err(|e| AppError::Io(format!("failed to stat log: {e}")))?;
        let len = meta.len();

        let identity = file_identity(&meta);
        if identity != self.identity {
            debug!(path = %self.path.display(), "log replaced, reading the new file from the start");
            self.reset();
            self.identity = identity;
        } else if len < self.offset {
            debug!(path = %self.path.display(), "log truncated, reading from the start");
            self.reset();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))
            .await
            .map_err(|e| AppError::Io(format!("failed to seek log: {e}")))?;
        let mut chunk = Vec::new();
        let read = file
            .take(len - self.offset)
            .read_to_end(&mut chunk)
            .await
            .map_err(|e| AppError::Io(format!("failed to read log: {e}")))?;
        self.offset += u64::try_from(read).unwrap_or(u64::MAX);
        self.pending.extend_from_slice(&chunk);

        Ok(self.take_complete_lines())
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let raw = &raw[..pos];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            lines.push(String::from_utf8_lossy(raw).into_owned());
        }
        lines
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.pending.clear();
    }
}

#[cfg(unix)]
fn file_identity(meta: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &Metadata) -> Option<(u64, u64)> {
    None
}

/// Watch the parent directory and signal `wake_tx` on events for `path`.
///
/// Returns `None` when no watcher can be created; polling still works.
fn spawn_watcher(path: &Path, wake_tx: mpsc::UnboundedSender<()>) -> Option<RecommendedWatcher> {
    let file_name = path.file_name()?.to_owned();
    let watch_dir = path.parent().filter(|p| !p.as_os_str().is_empty())?.to_owned();

    let mut watcher = notify::recommended_watcher(
        move |result: std::result::Result<Event, notify::Error>| match result {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) && event
                    .paths
                    .iter()
                    .any(|p| p.file_name().is_some_and(|name| name == file_name));
                if relevant {
                    let _ = wake_tx.send(());
                }
            }
            Err(err) => warn!(%err, "log watcher error"),
        },
    )
    .map_err(|err| warn!(%err, "failed to create log watcher, polling only"))
    .ok()?;

    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(|err| {
            warn!(%err, dir = %watch_dir.display(), "failed to watch log dir, polling only");
        })
        .ok()?;

    Some(watcher)
}
