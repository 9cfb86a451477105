#![forbid(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod errors;
pub mod logs;
pub mod models;
pub mod persistence;
pub mod protocol;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
