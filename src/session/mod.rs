//! Per-endpoint session handling.
//!
//! Each accepted stream becomes one session made of two independent tasks
//! sharing a per-session [`CancellationToken`]:
//!
//! - `dispatch`: the write side, sending probes, priority tasks, and noise.
//! - `reader`: the read side, decoding tagged lines into identity updates
//!   and the per-endpoint log.
//!
//! Whichever side stops first cancels the token, which stops the other.
//! Sessions share nothing in memory; the store is the only common resource.

pub mod dispatch;
pub mod identity;
pub mod listener;
pub mod reader;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::config::{endpoint_log_path, DispatchConfig, GlobalConfig};
use crate::logs::{ActivityLog, EndpointLog};
use crate::models::endpoint::EndpointAddress;
use crate::persistence::db::Database;
use crate::persistence::endpoint_repo::EndpointRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::Result;

use self::dispatch::Dispatcher;
use self::identity::IdentityResolver;

/// Everything a session needs, cloned into each accepted connection.
#[derive(Clone)]
pub struct SessionContext {
    /// Immutable dispatch timing and noise catalog.
    pub dispatch: Arc<DispatchConfig>,
    /// Endpoint identity records.
    pub endpoints: EndpointRepo,
    /// Durable priority queue.
    pub tasks: TaskRepo,
    /// Global priority command log.
    pub activity: ActivityLog,
    /// Directory of per-endpoint logs.
    pub log_dir: PathBuf,
}

impl SessionContext {
    /// Build a context from loaded configuration and an open database.
    #[must_use]
    pub fn new(config: &GlobalConfig, db: Arc<Database>) -> Self {
        Self {
            dispatch: Arc::new(config.dispatch.clone()),
            endpoints: EndpointRepo::new(Arc::clone(&db)),
            tasks: TaskRepo::new(db),
            activity: ActivityLog::new(config.activity_log_path()),
            log_dir: config.log_dir(),
        }
    }
}

/// Run one endpoint session to completion.
///
/// Registers the endpoint, opens its log, spawns the dispatch loop, and
/// drives the read loop on the current task. Returns once both sides have
/// stopped. `shutdown` cancels the session from outside.
///
/// # Errors
///
/// Returns `AppError::Transport` if the read side failed. Dispatch-side
/// write failures are logged.
pub async fn run_session<R, W>(
    address: EndpointAddress,
    reader: R,
    writer: W,
    ctx: SessionContext,
    shutdown: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    listener::register(&ctx.endpoints, &address).await;

    let log_path = endpoint_log_path(&ctx.log_dir, &address);
    let log = match EndpointLog::open(log_path).await {
        Ok(log) => Some(log),
        Err(err) => {
            warn!(%err, "endpoint log unavailable, priority output will not be recorded");
            None
        }
    };

    let cancel = shutdown.child_token();

    let dispatcher = Dispatcher::new(
        address,
        writer,
        Arc::clone(&ctx.dispatch),
        ctx.tasks.clone(),
        ctx.activity.clone(),
    );
    let dispatch_handle = tokio::spawn(dispatcher.run(cancel.clone()).instrument(Span::current()));

    let resolver = IdentityResolver::new(ctx.endpoints.clone());
    let read_result = reader::run_reader(address, reader, log, resolver, cancel.clone()).await;
    cancel.cancel();

    match dispatch_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(%err, "dispatch loop stopped on error"),
        Err(err) => warn!(%err, "dispatch task panicked"),
    }

    info!("session closed");
    read_result
}
