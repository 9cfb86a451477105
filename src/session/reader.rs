//! Read loop: the read side of a session.
//!
//! Drives a [`FramedRead`] with [`TaggedLineCodec`] so partial lines are
//! reassembled across reads, then routes each decoded line:
//!
//! | Tag                  | Action                                  |
//! |----------------------|-----------------------------------------|
//! | `[PRIORITY:1]`       | body appended to the per-endpoint log   |
//! | `[PRIORITY_<probe>]` | body handed to the [`IdentityResolver`] |
//! | `[PRIORITY:0]`       | traced only                             |
//! | *(untagged)*         | traced only                             |

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::logs::EndpointLog;
use crate::models::endpoint::EndpointAddress;
use crate::protocol::codec::TaggedLineCodec;
use crate::protocol::{decode, LineTag};
use crate::{AppError, Result};

use super::identity::IdentityResolver;

/// Read and route lines until EOF, a read error, or cancellation.
///
/// Always cancels `cancel` on exit so the dispatch loop stops too. A clean
/// remote close ends the session just like an error does.
///
/// # Errors
///
/// Returns `AppError::Transport` if reading from the stream fails.
pub async fn run_reader<R>(
    address: EndpointAddress,
    stream: R,
    mut log: Option<EndpointLog>,
    resolver: IdentityResolver,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stream, TaggedLineCodec::new());

    let result = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("reader: session cancelled");
                break Ok(());
            }

            item = framed.next() => match item {
                None => {
                    debug!("reader: remote closed stream");
                    break Ok(());
                }
                Some(Err(err)) => {
                    warn!(%err, "reader: read failed");
                    break Err(AppError::Transport(format!("read from {address} failed: {err}")));
                }
                Some(Ok(line)) => route_line(&address, &line, log.as_mut(), &resolver).await,
            }
        }
    };

    cancel.cancel();
    result
}

async fn route_line(
    address: &EndpointAddress,
    line: &str,
    log: Option<&mut EndpointLog>,
    resolver: &IdentityResolver,
) {
    let tagged = decode(line);
    match tagged.tag {
        LineTag::Priority => {
            debug!(body = %tagged.body, "priority output");
            if let Some(log) = log {
                if let Err(err) = log.append(&tagged.body).await {
                    warn!(%err, path = %log.path().display(), "failed to append priority output");
                }
            }
        }
        LineTag::Probe(name) => {
            resolver.resolve(address, &name, &tagged.body).await;
        }
        LineTag::Noise => trace!(body = %tagged.body, "noise output"),
        LineTag::None => trace!(line, "untagged output"),
    }
}
