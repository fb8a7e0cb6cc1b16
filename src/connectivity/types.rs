//! Connectivity state, snapshots and error definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The tracker's current determination of backend reachability.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// Not enough evidence yet. Treated optimistically by consumers.
    #[default]
    Unknown = 0,
    /// A stream has been established with the backend.
    Online = 1,
    /// The backend is considered unreachable.
    Offline = 2,
}

impl ConnectivityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Unknown => "unknown",
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectivityState {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(ConnectivityState::Unknown),
            "online" => Ok(ConnectivityState::Online),
            "offline" => Ok(ConnectivityState::Offline),
            other => Err(TrackerError::InvalidState(other.to_string())),
        }
    }
}

/// Point-in-time view of the tracker internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub state: ConnectivityState,
    /// Consecutive stream failures seen while not online.
    pub failures: u32,
    /// Whether an online-timeout is currently scheduled.
    pub timeout_pending: bool,
    /// Whether the next offline episode will surface a warning.
    pub warning_armed: bool,
    /// Total offline warnings emitted over the tracker's lifetime.
    pub warnings_emitted: u64,
}

/// Errors surfaced by the tracker service.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// The task owning the tracker has stopped.
    #[error("connectivity tracker is no longer running")]
    Closed,

    /// A state name could not be parsed.
    #[error("invalid connectivity state: {0:?} (expected online, offline or unknown)")]
    InvalidState(String),
}

/// Result type for tracker service operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
