//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Trigger → tracker task leaves its loop → tracker (and timer) dropped
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
