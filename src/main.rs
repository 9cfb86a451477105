#![forbid(unsafe_code)]

//! `noise-generator`: tasking and telemetry server binary.
//!
//! Bootstraps configuration and the database, then runs the endpoint
//! listener (one session per accepted shell) and the live bridge HTTP
//! server until ctrl-c or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use noise_generator::bridge::server::{self, BridgeState};
use noise_generator::config::GlobalConfig;
use noise_generator::persistence::db;
use noise_generator::session::{listener, SessionContext};
use noise_generator::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "noise-generator", about = "Tagged shell tasking server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the endpoint listen address.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the live bridge HTTP address.
    #[arg(long)]
    web: Option<SocketAddr>,

    /// Override the data directory (database and logs).
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("noise-generator server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(web) = args.web {
        config.web_addr = web;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    info!(
        listen = %config.listen_addr,
        web = %config.web_addr,
        data_dir = %config.data_dir.display(),
        "configuration loaded"
    );

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!(path = %config.db_path().display(), "database connected");

    // ── Bind listeners ──────────────────────────────────
    let endpoint_listener = listener::bind(config.listen_addr).await?;
    let web_listener = TcpListener::bind(config.web_addr)
        .await
        .map_err(|err| AppError::Bridge(format!("failed to bind {}: {err}", config.web_addr)))?;

    // ── Start services ──────────────────────────────────
    let ct = CancellationToken::new();

    let session_ctx = SessionContext::new(&config, Arc::clone(&db));
    let listener_handle = tokio::spawn(listener::serve(endpoint_listener, session_ctx, ct.clone()));

    let bridge_state = BridgeState::new(&config, db);
    let bridge_ct = ct.clone();
    let bridge_handle = tokio::spawn(async move {
        if let Err(err) = server::serve(web_listener, bridge_state, bridge_ct).await {
            error!(%err, "live bridge failed");
        }
    });

    info!("server ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(listener_handle, bridge_handle);
    info!("noise-generator shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
