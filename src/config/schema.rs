//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connectivity::tracker::{DEFAULT_MAX_FAILURES, DEFAULT_ONLINE_TIMEOUT};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TrackerConfig {
    /// Connectivity heuristics.
    pub tracker: ConnectivityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Thresholds for the connectivity heuristics.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Consecutive stream failures before the client is declared offline.
    pub max_failures: u32,

    /// Time allowed in `Unknown` after a stream start, in milliseconds.
    pub online_timeout_ms: u64,

    /// Capacity of the command channel feeding the tracker task.
    pub command_buffer: usize,
}

impl ConnectivityConfig {
    pub fn online_timeout(&self) -> Duration {
        Duration::from_millis(self.online_timeout_ms)
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            online_timeout_ms: DEFAULT_ONLINE_TIMEOUT.as_millis() as u64,
            command_buffer: 64,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
