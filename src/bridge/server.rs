//! HTTP/WebSocket transport for the live bridge.
//!
//! | Route                         | Purpose                                  |
//! |-------------------------------|------------------------------------------|
//! | `GET /health`                 | liveness probe                           |
//! | `GET /api/endpoints`          | JSON list of endpoint records            |
//! | `GET /api/tasks`              | JSON list of pending priority tasks      |
//! | `GET /ws/tail?address=A`      | push new lines of A's log                |
//! | `GET /ws/inject?address=A`    | queue each text message as a task        |
//! | `GET /ws/live?address=A`      | both directions on one socket            |
//!
//! `address` is required on every WebSocket route; a missing or malformed
//! value is rejected with `400` before the upgrade.
//!
//! Tail frames carry the log line verbatim. On `/ws/inject` each queued task
//! is acknowledged with `{"type":"queued","id":..,"command":".."}`; `/ws/live`
//! sends no acknowledgements so every frame it pushes is a log line.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::follow::LogFollower;
use crate::config::{endpoint_log_path, GlobalConfig};
use crate::models::endpoint::{EndpointAddress, EndpointRecord};
use crate::models::task::PriorityTask;
use crate::persistence::db::Database;
use crate::persistence::endpoint_repo::EndpointRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::{AppError, Result};

/// Shared state for bridge handlers.
#[derive(Clone)]
pub struct BridgeState {
    /// Endpoint identity records.
    pub endpoints: EndpointRepo,
    /// Durable priority queue.
    pub tasks: TaskRepo,
    /// Directory of per-endpoint logs.
    pub log_dir: PathBuf,
}

impl BridgeState {
    /// Build bridge state from loaded configuration and an open database.
    #[must_use]
    pub fn new(config: &GlobalConfig, db: Arc<Database>) -> Self {
        Self {
            endpoints: EndpointRepo::new(Arc::clone(&db)),
            tasks: TaskRepo::new(db),
            log_dir: config.log_dir(),
        }
    }
}

/// Query parameters accepted by the WebSocket routes.
#[derive(Debug, Deserialize)]
pub struct BridgeQuery {
    /// Endpoint address, `ip:port`.
    pub address: Option<String>,
}

impl BridgeQuery {
    /// Validate and parse the required `address` parameter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the parameter is absent, blank, or
    /// not a socket address.
    pub fn address(&self) -> Result<EndpointAddress> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| AppError::Config("missing required parameter: address".into()))?
            .parse()
    }
}

/// Which directions a bridge socket carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Log lines pushed to the client.
    Tail,
    /// Client messages queued as priority tasks.
    Inject,
    /// Both of the above.
    Live,
}

impl Direction {
    fn name(self) -> &'static str {
        match self {
            Self::Tail => "tail",
            Self::Inject => "inject",
            Self::Live => "live",
        }
    }

    fn tails(self) -> bool {
        matches!(self, Self::Tail | Self::Live)
    }

    fn injects(self) -> bool {
        matches!(self, Self::Inject | Self::Live)
    }
}

/// Reply frames sent on `/ws/inject`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InjectReply {
    Queued { id: i64, command: String },
    Error { message: String },
}

type WsSink = Mutex<SplitSink<WebSocket, Message>>;

/// Build the bridge router.
#[must_use]
pub fn router(state: BridgeState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/endpoints", get(list_endpoints))
        .route("/api/tasks", get(list_tasks))
        .route("/ws/tail", get(tail_ws))
        .route("/ws/inject", get(inject_ws))
        .route("/ws/live", get(live_ws))
        .with_state(state)
}

/// Serve the bridge on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Bridge` if the server fails.
pub async fn serve(listener: TcpListener, state: BridgeState, ct: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "live bridge listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Bridge(format!("http server failed: {err}")))
}

async fn health() -> &'static str {
    "ok"
}

async fn list_endpoints(
    State(state): State<BridgeState>,
) -> std::result::Result<Json<Vec<EndpointRecord>>, Response> {
    state.endpoints.list().await.map(Json).map_err(internal_error)
}

async fn list_tasks(
    State(state): State<BridgeState>,
) -> std::result::Result<Json<Vec<PriorityTask>>, Response> {
    state.tasks.list().await.map(Json).map_err(internal_error)
}

async fn tail_ws(
    State(state): State<BridgeState>,
    Query(query): Query<BridgeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, state, &query, Direction::Tail)
}

async fn inject_ws(
    State(state): State<BridgeState>,
    Query(query): Query<BridgeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, state, &query, Direction::Inject)
}

async fn live_ws(
    State(state): State<BridgeState>,
    Query(query): Query<BridgeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, state, &query, Direction::Live)
}

fn upgrade(
    ws: WebSocketUpgrade,
    state: BridgeState,
    query: &BridgeQuery,
    direction: Direction,
) -> Response {
    let address = match query.address() {
        Ok(address) => address,
        Err(err) => {
            debug!(%err, direction = direction.name(), "rejecting bridge request");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    let span = info_span!("bridge", direction = direction.name(), %address);
    ws.on_upgrade(move |socket| run_bridge(socket, state, address, direction).instrument(span))
}

async fn run_bridge(
    socket: WebSocket,
    state: BridgeState,
    address: EndpointAddress,
    direction: Direction,
) {
    info!("bridge opened");
    let (sink, stream) = socket.split();
    let sink: WsSink = Mutex::new(sink);

    let follower = if direction.tails() {
        match LogFollower::open(endpoint_log_path(&state.log_dir, &address)).await {
            Ok(follower) => Some(follower),
            Err(err) => {
                warn!(%err, "cannot follow endpoint log");
                let _ = sink.lock().await.send(Message::Close(None)).await;
                return;
            }
        }
    } else {
        None
    };

    let tail = async {
        match follower {
            Some(mut follower) => pump_tail(&mut follower, &sink).await,
            None => std::future::pending::<Result<()>>().await,
        }
    };
    let inbound = pump_inbound(stream, direction, &state.tasks, &sink);

    let result = tokio::select! {
        result = tail => result,
        result = inbound => result,
    };

    match result {
        Ok(()) => info!("bridge closed"),
        Err(err) => warn!(%err, "bridge closed on error"),
    }
}

/// Push every new log line to the client, verbatim.
async fn pump_tail(follower: &mut LogFollower, sink: &WsSink) -> Result<()> {
    loop {
        for line in follower.next_lines().await? {
            sink.lock()
                .await
                .send(Message::Text(line.into()))
                .await
                .map_err(|err| AppError::Bridge(format!("send failed: {err}")))?;
        }
    }
}

/// Consume client frames until close; queue text frames when injecting.
async fn pump_inbound(
    mut stream: SplitStream<WebSocket>,
    direction: Direction,
    tasks: &TaskRepo,
    sink: &WsSink,
) -> Result<()> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|err| AppError::Bridge(format!("receive failed: {err}")))?;
        match frame {
            Message::Text(text) if direction.injects() => {
                let command = text.as_str().trim_end_matches(['\r', '\n']);
                if command.trim().is_empty() {
                    continue;
                }

                let reply = match tasks.insert(command).await {
                    Ok(task) => {
                        info!(task_id = task.id, command = %task.command, "injected priority task");
                        InjectReply::Queued {
                            id: task.id,
                            command: task.command,
                        }
                    }
                    Err(err) => {
                        error!(%err, "failed to queue injected task");
                        InjectReply::Error {
                            message: err.to_string(),
                        }
                    }
                };

                if direction == Direction::Inject {
                    send_json(sink, &reply).await?;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

async fn send_json<T: Serialize>(sink: &WsSink, value: &T) -> Result<()> {
    let payload = serde_json::to_string(value)
        .map_err(|err| AppError::Bridge(format!("failed to serialise reply: {err}")))?;
    sink.lock()
        .await
        .send(Message::Text(payload.into()))
        .await
        .map_err(|err| AppError::Bridge(format!("send failed: {err}")))
}

fn internal_error(err: AppError) -> Response {
    error!(%err, "bridge request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}
