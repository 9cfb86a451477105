#![forbid(unsafe_code)]

//! `noise-generator-ctl`: administrative CLI for `noise-generator`.
//!
//! Edits the priority queue and inspects endpoint records directly in the
//! shared `SQLite` database; the server does not need to be running.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use noise_generator::config::GlobalConfig;
use noise_generator::models::endpoint::{EndpointAddress, IdentityField};
use noise_generator::persistence::db;
use noise_generator::persistence::endpoint_repo::EndpointRepo;
use noise_generator::persistence::task_repo::TaskRepo;
use noise_generator::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "noise-generator-ctl",
    about = "Administrative CLI for noise-generator",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the server's TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database file; overrides the path derived from the configuration.
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Queue a priority task for every open session.
    PriorityAdd {
        /// Command words, joined with spaces.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Remove every queued task with exactly this text.
    PriorityRemove {
        /// Command words, joined with spaces.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Remove one queued task by identifier.
    PriorityRemoveId {
        /// Task identifier as shown by `priority-list`.
        id: i64,
    },

    /// List queued priority tasks.
    PriorityList,

    /// List known endpoints and their resolved identity.
    ListConnections,

    /// Set an operator nickname on an endpoint.
    Nickname {
        /// Endpoint address, `ip:port`.
        address: String,
        /// Label to assign.
        nickname: String,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    let db_path = args.db.unwrap_or_else(|| config.db_path());
    let db = Arc::new(db::connect(&db_path).await?);

    let tasks = TaskRepo::new(Arc::clone(&db));
    let endpoints = EndpointRepo::new(db);

    match args.command {
        Command::PriorityAdd { command } => {
            let task = tasks.insert(&command.join(" ")).await?;
            println!("Added priority command #{}: {}", task.id, task.command);
        }
        Command::PriorityRemove { command } => {
            let command = command.join(" ");
            let removed = tasks.delete_by_command(&command).await?;
            println!("Removed {removed} priority command(s): {command}");
        }
        Command::PriorityRemoveId { id } => {
            if !tasks.delete(id).await? {
                return Err(AppError::NotFound(format!("priority command #{id}")));
            }
            println!("Removed priority command #{id}");
        }
        Command::PriorityList => {
            let pending = tasks.list().await?;
            println!("Pending priority commands: {}", pending.len());
            for task in pending {
                println!("#{} [{}] {}", task.id, task.created_at.to_rfc3339(), task.command);
            }
        }
        Command::ListConnections => {
            let records = endpoints.list().await?;
            println!("Known connections: {}", records.len());
            for record in records {
                println!(
                    "{}  first seen {}  last seen {}  uname: {}  user: {}  nickname: {}",
                    record.address,
                    record.first_seen.to_rfc3339(),
                    record.last_seen.to_rfc3339(),
                    record.uname.as_deref().unwrap_or("-"),
                    record.user.as_deref().unwrap_or("-"),
                    record.nickname.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Nickname { address, nickname } => {
            let address: EndpointAddress = address.parse()?;
            endpoints
                .update_field(&address, IdentityField::Nickname, &nickname)
                .await?;
            println!("Nickname for {address} set to {nickname}");
        }
    }

    Ok(())
}
