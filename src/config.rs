//! Global configuration parsing and validation.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::endpoint::EndpointAddress;
use crate::{AppError, Result};

const DB_FILENAME: &str = "commands.db";
const LOG_DIRNAME: &str = "logs";
const ACTIVITY_LOG_FILENAME: &str = "priority.log";

/// Timing and catalog settings handed to every dispatch loop.
///
/// Shared immutably behind an `Arc`; nothing mutates it after load.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DispatchConfig {
    /// Pause after each identity probe.
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
    /// Pause after each drained priority task.
    #[serde(default = "default_task_throttle_ms")]
    pub task_throttle_ms: u64,
    /// Pause between the end of a drain and the next noise command.
    #[serde(default = "default_noise_interval_ms")]
    pub noise_interval_ms: u64,
    /// Background commands picked pseudo-randomly each cycle.
    #[serde(default = "default_noise_catalog")]
    pub noise_catalog: Vec<String>,
}

impl DispatchConfig {
    /// Delay after each identity probe.
    #[must_use]
    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    /// Delay after each drained priority task.
    #[must_use]
    pub fn task_throttle(&self) -> Duration {
        Duration::from_millis(self.task_throttle_ms)
    }

    /// Delay before each noise command.
    #[must_use]
    pub fn noise_interval(&self) -> Duration {
        Duration::from_millis(self.noise_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.noise_catalog.is_empty() {
            return Err(AppError::Config(
                "dispatch.noise_catalog must not be empty".into(),
            ));
        }
        if self.noise_catalog.iter().any(|cmd| cmd.trim().is_empty()) {
            return Err(AppError::Config(
                "dispatch.noise_catalog must not contain blank commands".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            probe_delay_ms: default_probe_delay_ms(),
            task_throttle_ms: default_task_throttle_ms(),
            noise_interval_ms: default_noise_interval_ms(),
            noise_catalog: default_noise_catalog(),
        }
    }
}

fn default_probe_delay_ms() -> u64 {
    1000
}

fn default_task_throttle_ms() -> u64 {
    2000
}

fn default_noise_interval_ms() -> u64 {
    5000
}

fn default_noise_catalog() -> Vec<String> {
    [
        "ls -la",
        "pwd",
        "whoami",
        "date",
        "uptime",
        "hostname",
        "df -h",
        "free -m",
        "ifconfig",
        "netstat -tuln",
        "ps aux",
        "top -b -n1",
        "cat /etc/os-release",
        "uname -a",
        "who",
        "last",
        "service --status-all",
        "systemctl list-units --type=service",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_web_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Global configuration parsed from `config.toml`.
///
/// Every key is optional; an empty document yields the defaults.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// TCP address accepting endpoint connections.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// HTTP address serving the live bridge.
    #[serde(default = "default_web_addr")]
    pub web_addr: SocketAddr,
    /// Directory holding the database and log files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Dispatch loop timing and noise catalog.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            web_addr: default_web_addr(),
            data_dir: default_data_dir(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.dispatch.validate()?;
        Ok(config)
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILENAME)
    }

    /// Directory holding one append-only log per endpoint.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(LOG_DIRNAME)
    }

    /// Global log of every priority command sent to any session.
    #[must_use]
    pub fn activity_log_path(&self) -> PathBuf {
        self.data_dir.join(ACTIVITY_LOG_FILENAME)
    }

    /// Per-endpoint log path, deterministic from the address.
    #[must_use]
    pub fn endpoint_log_path(&self, address: &EndpointAddress) -> PathBuf {
        endpoint_log_path(&self.log_dir(), address)
    }
}

/// Resolve the log file for `address` inside `log_dir`.
#[must_use]
pub fn endpoint_log_path(log_dir: &Path, address: &EndpointAddress) -> PathBuf {
    log_dir.join(format!("{}.log", address.file_stem()))
}
