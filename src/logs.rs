//! Append-only text logs fed by sessions and followed by the live bridge.
//!
//! - [`EndpointLog`]: one file per endpoint, one line per `[PRIORITY:1]` body.
//! - [`ActivityLog`]: a single file recording every priority command sent,
//!   as `[COMMAND]<command>` lines.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::{AppError, Result};

const COMMAND_PREFIX: &str = "[COMMAND]";

async fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            AppError::Io(format!("failed to create log dir {}: {e}", parent.display()))
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| AppError::Io(format!("failed to open log {}: {e}", path.display())))
}

/// One endpoint's output log, owned by its session.
///
/// The file is reopened by path for every append, so a log rotated away
/// underneath a live session is recreated and the bridge tail keeps seeing
/// new output.
#[derive(Debug)]
pub struct EndpointLog {
    path: PathBuf,
}

impl EndpointLog {
    /// Create the log at `path` if absent and check it is writable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be opened.
    pub async fn open(path: PathBuf) -> Result<Self> {
        open_append(&path).await?;
        Ok(Self { path })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `line` followed by a newline and flush.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be reopened or written.
    pub async fn append(&mut self, line: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        let mut file = open_append(&self.path).await?;
        file.write_all(&bytes)
            .await
            .map_err(|e| AppError::Io(format!("log write failed: {e}")))?;
        file.flush()
            .await
            .map_err(|e| AppError::Io(format!("log flush failed: {e}")))
    }
}

/// Global record of priority commands sent to any session.
///
/// Opened per write so that concurrent sessions never share a handle.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    /// Create a logger writing to `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `[COMMAND]<command>`. Failures are logged, never returned.
    pub async fn record_command(&self, command: &str) {
        let line = format!("{COMMAND_PREFIX}{command}\n");
        let result = async {
            let mut file = open_append(&self.path).await?;
            file.write_all(line.as_bytes())
                .await
                .map_err(|e| AppError::Io(format!("activity log write failed: {e}")))
        }
        .await;

        if let Err(err) = result {
            warn!(%err, path = %self.path.display(), "failed to record priority command");
        }
    }
}
