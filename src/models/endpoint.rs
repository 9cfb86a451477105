//! Endpoint identity model keyed by remote socket address.

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppError;

/// Remote address of an endpoint; the natural key of [`EndpointRecord`].
///
/// Displays as `ip:port` (`[v6]:port` for IPv6) and parses from the same form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointAddress(SocketAddr);

impl EndpointAddress {
    /// Wrap a socket address.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// IP portion as stored in the `endpoint.ip` column.
    #[must_use]
    pub fn ip(&self) -> String {
        self.0.ip().to_string()
    }

    /// Port portion as stored in the `endpoint.port` column.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// File-system safe stem used for the per-endpoint log file.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.ip().replace(':', "-"), self.port())
    }
}

impl From<SocketAddr> for EndpointAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl Display for EndpointAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EndpointAddress {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Self)
            .map_err(|err| AppError::Config(format!("invalid endpoint address '{s}': {err}")))
    }
}

/// Identity fields that can be written on an endpoint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    /// Kernel/system description reported by `uname -a`.
    Uname,
    /// Account name reported by `whoami`.
    User,
    /// Operator-assigned label.
    Nickname,
}

/// Persisted identity metadata for a remote endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointRecord {
    /// Remote socket address.
    pub address: EndpointAddress,
    /// First accepted connection from this address.
    pub first_seen: DateTime<Utc>,
    /// Most recent accepted connection from this address.
    pub last_seen: DateTime<Utc>,
    /// Output of the `uname` probe, once resolved.
    pub uname: Option<String>,
    /// Output of the `whoami` probe, once resolved.
    pub user: Option<String>,
    /// Operator-assigned label.
    pub nickname: Option<String>,
}
