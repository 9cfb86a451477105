//! Live bridge between operator browsers and persisted session state.
//!
//! - `follow`: [`LogFollower`](follow::LogFollower), tailing a per-endpoint
//!   log from its current end.
//! - `server`: axum router exposing the tail and inject WebSocket directions
//!   plus read-only JSON listings.
//!
//! Bridges never talk to sessions directly: tail reads the file sessions
//! append to, inject writes to the durable queue sessions drain.

pub mod follow;
pub mod server;
