//! Dispatch loop: the write side of a session.
//!
//! Sends both identity probes once, then cycles forever:
//!
//! 1. drain every pending priority task (write, record, delete, throttle);
//! 2. wait the noise interval and send one catalog command.
//!
//! Delivery is broadcast: each session drains its own snapshot of the full
//! table, so a task read by several sessions before its first deletion is
//! sent to all of them. A write failure ends the session.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::logs::ActivityLog;
use crate::models::endpoint::EndpointAddress;
use crate::models::task::PriorityTask;
use crate::persistence::task_repo::TaskRepo;
use crate::protocol::{encode, Probe, Tag};
use crate::{AppError, Result};

/// Index into a catalog of `len` entries derived from `seed`.
///
/// Returns `None` for an empty catalog. Every index is reachable: seeds
/// `0..len` map onto `0..len` one to one.
#[must_use]
pub fn noise_index(seed: u32, len: usize) -> Option<usize> {
    usize::try_from(seed).ok()?.checked_rem(len)
}

/// Pick a catalog entry using `seed`.
#[must_use]
pub fn pick_noise(catalog: &[String], seed: u32) -> Option<&str> {
    noise_index(seed, catalog.len())
        .and_then(|idx| catalog.get(idx))
        .map(String::as_str)
}

/// Cheap time-derived seed; no shared RNG state.
fn time_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or_default()
}

/// Sleep for `delay` unless `cancel` fires first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> ControlFlow<()> {
    tokio::select! {
        () = cancel.cancelled() => ControlFlow::Break(()),
        () = tokio::time::sleep(delay) => ControlFlow::Continue(()),
    }
}

/// Write side of one session.
pub struct Dispatcher<W> {
    address: EndpointAddress,
    writer: W,
    config: Arc<DispatchConfig>,
    tasks: TaskRepo,
    activity: ActivityLog,
}

impl<W> Dispatcher<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a dispatcher writing to `writer`.
    #[must_use]
    pub fn new(
        address: EndpointAddress,
        writer: W,
        config: Arc<DispatchConfig>,
        tasks: TaskRepo,
        activity: ActivityLog,
    ) -> Self {
        Self {
            address,
            writer,
            config,
            tasks,
            activity,
        }
    }

    /// Run until cancelled or a write fails, then close the write side.
    ///
    /// Always cancels `cancel` on exit so the read loop stops too.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` when a write fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let result = self.cycle(&cancel).await;
        cancel.cancel();

        // The read side may already have torn the stream down.
        if let Err(err) = self.writer.shutdown().await {
            debug!(%err, "write half already closed");
        }
        result
    }

    async fn cycle(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.send_probes(cancel).await?.is_break() {
            return Ok(());
        }

        loop {
            match self.tasks.list().await {
                Ok(snapshot) => {
                    if self.drain(&snapshot, cancel).await?.is_break() {
                        return Ok(());
                    }
                }
                Err(err) => warn!(%err, "failed to read priority queue, skipping drain"),
            }

            if pause(self.config.noise_interval(), cancel).await.is_break() {
                return Ok(());
            }
            self.send_noise(time_seed()).await?;
        }
    }

    /// Send every identity probe, pausing after each.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` when a write fails.
    pub async fn send_probes(&mut self, cancel: &CancellationToken) -> Result<ControlFlow<()>> {
        for probe in Probe::ALL {
            self.write_line(&encode(probe.command(), Tag::Probe(probe)))
                .await?;
            debug!(probe = probe.name(), "sent identity probe");

            if pause(self.config.probe_delay(), cancel).await.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Deliver each task in `snapshot`, in order.
    ///
    /// Per task: write, record in the activity log, delete from the store,
    /// throttle. The task is deleted without any confirmation from the
    /// remote. A failed delete is logged; the task may then be delivered
    /// again next cycle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` when a write fails; the remaining tasks
    /// stay queued.
    pub async fn drain(
        &mut self,
        snapshot: &[PriorityTask],
        cancel: &CancellationToken,
    ) -> Result<ControlFlow<()>> {
        for task in snapshot {
            self.write_line(&encode(&task.command, Tag::Priority))
                .await?;
            info!(task_id = task.id, command = %task.command, "sent priority task");

            self.activity.record_command(&task.command).await;

            match self.tasks.delete(task.id).await {
                Ok(true) => {}
                Ok(false) => debug!(task_id = task.id, "task already drained by another session"),
                Err(err) => warn!(%err, task_id = task.id, "failed to delete priority task"),
            }

            if pause(self.config.task_throttle(), cancel).await.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Send the catalog entry selected by `seed`; returns the command sent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an empty catalog or
    /// `AppError::Transport` when the write fails.
    pub async fn send_noise(&mut self, seed: u32) -> Result<String> {
        let command = pick_noise(&self.config.noise_catalog, seed)
            .ok_or_else(|| AppError::Config("noise catalog is empty".into()))?
            .to_owned();

        self.write_line(&encode(&command, Tag::Noise)).await?;
        debug!(command = %command, "sent noise command");
        Ok(command)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let written = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        }
        .await;

        written.map_err(|err| {
            warn!(address = %self.address, %err, "write to endpoint failed");
            AppError::Transport(format!("write to {} failed: {err}", self.address))
        })
    }
}
