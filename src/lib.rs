//! Connectivity state tracking for clients holding a streaming connection to a backend.
//!
//! Feed stream starts, stream failures and explicit overrides in; get a
//! debounced `Online` / `Offline` / `Unknown` determination out.

pub mod config;
pub mod connectivity;
pub mod lifecycle;
pub mod observability;

pub use config::TrackerConfig;
pub use connectivity::{ConnectivityState, ConnectivityTracker, TrackerHandle, TrackerService};
pub use lifecycle::Shutdown;
