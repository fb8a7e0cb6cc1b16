//! Connectivity tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Connection manager:
//!     stream started / stream failed / explicit override
//!     → service.rs (TrackerHandle → mpsc → single owner task)
//!     → tracker.rs (state machine, failure counter, online timeout)
//!     → on_state_changed callback + watch channel
//! ```
//!
//! # Design Decisions
//! - The tracker never touches the transport; it only hears about attempts
//! - One failure on an established stream is noise; repeated failures
//!   before the stream stabilizes are a real signal
//! - Waiting in `Unknown` is bounded by the online timeout
//! - The operator warning fires once per offline episode

pub mod service;
pub mod tracker;
pub mod types;

pub use service::{TrackerHandle, TrackerService};
pub use tracker::{ConnectivityTracker, PendingTimeout};
pub use types::{ConnectivityState, TrackerError, TrackerResult, TrackerSnapshot};
