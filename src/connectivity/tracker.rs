//! Connectivity state machine.
//!
//! # State Transitions
//! ```text
//! any      → Unknown: stream start (arms the online timeout if none pending)
//! Unknown  → Offline: online timeout elapsed
//! Online   → Unknown: stream failure (forgiven, counter untouched)
//! Unknown/Offline → Offline: consecutive failures >= max_failures
//! any      → s:       explicit set(s) (clears timeout and counter)
//! ```
//!
//! # Design Decisions
//! - `&mut self` only; the owner serializes all entry points
//! - The timeout is plain data (generation + deadline). The owner sleeps
//!   until the deadline and feeds the generation back through `on_timeout`
//! - Observers hear about real changes only, never about no-op transitions

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ConnectivityConfig;
use crate::connectivity::types::{ConnectivityState, TrackerSnapshot};
use crate::observability::metrics;

/// Consecutive stream failures tolerated before declaring the client offline.
pub const DEFAULT_MAX_FAILURES: u32 = 2;

/// How long a stream may stay in `Unknown` before the client is declared offline.
pub const DEFAULT_ONLINE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Callback invoked on every actual state change.
pub type StateHandler = Box<dyn FnMut(ConnectivityState) + Send>;

/// A scheduled online timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimeout {
    generation: u64,
    deadline: Instant,
}

impl PendingTimeout {
    /// Identifies this particular scheduling; expiries for older generations are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Tracks whether the client should be treated as online, offline or undetermined.
pub struct ConnectivityTracker {
    state: ConnectivityState,
    failures: u32,
    pending_timeout: Option<PendingTimeout>,
    next_generation: u64,
    warn_on_offline: bool,
    warnings_emitted: u64,
    max_failures: u32,
    online_timeout: Duration,
    handler: StateHandler,
}

impl fmt::Debug for ConnectivityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityTracker")
            .field("state", &self.state)
            .field("failures", &self.failures)
            .field("pending_timeout", &self.pending_timeout)
            .field("warn_on_offline", &self.warn_on_offline)
            .finish_non_exhaustive()
    }
}

impl ConnectivityTracker {
    /// Create a tracker with the default thresholds.
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(ConnectivityState) + Send + 'static,
    {
        Self::with_config(&ConnectivityConfig::default(), handler)
    }

    /// Create a tracker using configured thresholds.
    pub fn with_config<F>(config: &ConnectivityConfig, handler: F) -> Self
    where
        F: FnMut(ConnectivityState) + Send + 'static,
    {
        Self {
            state: ConnectivityState::Unknown,
            failures: 0,
            pending_timeout: None,
            next_generation: 0,
            warn_on_offline: true,
            warnings_emitted: 0,
            max_failures: config.max_failures.max(1),
            online_timeout: config.online_timeout(),
            handler: Box::new(handler),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn pending_timeout(&self) -> Option<PendingTimeout> {
        self.pending_timeout
    }

    pub fn warnings_emitted(&self) -> u64 {
        self.warnings_emitted
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            state: self.state,
            failures: self.failures,
            timeout_pending: self.pending_timeout.is_some(),
            warning_armed: self.warn_on_offline,
            warnings_emitted: self.warnings_emitted,
        }
    }

    /// A new stream attempt has begun.
    pub fn on_stream_start(&mut self) {
        self.set_and_broadcast(ConnectivityState::Unknown);

        if self.pending_timeout.is_none() {
            self.next_generation += 1;
            let pending = PendingTimeout {
                generation: self.next_generation,
                deadline: Instant::now() + self.online_timeout,
            };
            tracing::debug!(
                generation = pending.generation,
                timeout_ms = self.online_timeout.as_millis() as u64,
                "Online timeout scheduled"
            );
            self.pending_timeout = Some(pending);
        }
    }

    /// The most recent stream attempt failed.
    pub fn on_stream_failure(&mut self, cause: &str) {
        metrics::record_stream_failure();

        if self.state == ConnectivityState::Online {
            // A single blip on an established stream is not a signal yet.
            self.set_and_broadcast(ConnectivityState::Unknown);
            return;
        }

        self.failures = self.failures.saturating_add(1);
        tracing::debug!(failures = self.failures, cause, "Stream failure recorded");

        if self.failures >= self.max_failures {
            self.clear_timeout();
            self.warn_if_necessary(&format!(
                "Connection failed {} times. Most recent error: {}",
                self.failures, cause
            ));
            self.set_and_broadcast(ConnectivityState::Offline);
        }
    }

    /// Explicit override from a caller with independent evidence.
    pub fn set(&mut self, new_state: ConnectivityState) {
        self.clear_timeout();
        self.failures = 0;

        if new_state == ConnectivityState::Online {
            // Re-arm for the next offline episode.
            self.warn_on_offline = true;
        }

        self.set_and_broadcast(new_state);
    }

    /// Deliver the expiry of a previously scheduled online timeout.
    ///
    /// Returns `true` when the expiry caused a transition. Expiries for a
    /// generation that is no longer pending are stale and ignored.
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        match self.pending_timeout {
            Some(pending) if pending.generation == generation => {}
            _ => {
                tracing::debug!(generation, "Ignoring stale online timeout");
                return false;
            }
        }

        self.pending_timeout = None;

        debug_assert_eq!(
            self.state,
            ConnectivityState::Unknown,
            "online timeout must be cancelled before leaving Unknown"
        );
        if self.state != ConnectivityState::Unknown {
            tracing::error!(
                state = %self.state,
                generation,
                "Online timeout fired outside of Unknown state, ignoring"
            );
            return false;
        }

        self.warn_if_necessary(&format!(
            "Backend didn't respond within {} seconds.",
            self.online_timeout.as_secs_f64()
        ));
        self.set_and_broadcast(ConnectivityState::Offline);
        true
    }

    fn clear_timeout(&mut self) {
        if let Some(pending) = self.pending_timeout.take() {
            tracing::debug!(generation = pending.generation, "Online timeout cancelled");
        }
    }

    fn warn_if_necessary(&mut self, details: &str) {
        if !self.warn_on_offline {
            return;
        }
        self.warn_on_offline = false;
        self.warnings_emitted += 1;
        metrics::record_offline_warning();

        tracing::warn!(
            "Could not reach backend. {} This typically indicates that the device does not \
             have a healthy network connection at the moment. The client will operate in \
             offline mode until it is able to successfully connect to the backend.",
            details
        );
    }

    fn set_and_broadcast(&mut self, new_state: ConnectivityState) {
        if new_state == self.state {
            return;
        }
        tracing::debug!(from = %self.state, to = %new_state, "Connectivity state changed");
        self.state = new_state;
        metrics::record_state_change(new_state);
        (self.handler)(new_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_tracker() -> (ConnectivityTracker, Arc<Mutex<Vec<ConnectivityState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = ConnectivityTracker::new(move |state| sink.lock().unwrap().push(state));
        (tracker, seen)
    }

    fn fire_pending(tracker: &mut ConnectivityTracker) -> bool {
        let pending = tracker.pending_timeout().expect("timeout should be pending");
        tracker.on_timeout(pending.generation())
    }

    #[test]
    fn test_initial_state() {
        let (tracker, seen) = recording_tracker();
        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        assert!(tracker.pending_timeout().is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stream_start_schedules_single_timeout_without_notifying() {
        let (mut tracker, seen) = recording_tracker();
        tracker.on_stream_start();

        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        assert!(seen.lock().unwrap().is_empty());
        let pending = tracker.pending_timeout().unwrap();
        assert_eq!(pending.generation(), 1);
    }

    #[test]
    fn test_repeated_stream_start_is_idempotent() {
        let (mut tracker, seen) = recording_tracker();
        tracker.on_stream_start();
        let first = tracker.pending_timeout().unwrap();
        tracker.on_stream_start();
        tracker.on_stream_start();

        assert_eq!(tracker.pending_timeout(), Some(first));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_two_failures_go_offline() {
        let (mut tracker, seen) = recording_tracker();
        tracker.on_stream_failure("connection refused");
        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        assert_eq!(tracker.failures(), 1);

        tracker.on_stream_failure("connection refused");
        assert_eq!(tracker.state(), ConnectivityState::Offline);
        assert_eq!(*seen.lock().unwrap(), vec![ConnectivityState::Offline]);
        assert_eq!(tracker.warnings_emitted(), 1);
    }

    #[test]
    fn test_failure_threshold_cancels_timeout() {
        let (mut tracker, _seen) = recording_tracker();
        tracker.on_stream_start();
        tracker.on_stream_failure("reset");
        assert!(tracker.pending_timeout().is_some());
        tracker.on_stream_failure("reset");
        assert!(tracker.pending_timeout().is_none());
    }

    #[test]
    fn test_failure_after_online_is_forgiven() {
        let (mut tracker, seen) = recording_tracker();
        tracker.on_stream_start();
        tracker.set(ConnectivityState::Online);
        tracker.on_stream_failure("stream closed");

        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        assert_eq!(tracker.failures(), 0);
        assert!(tracker.pending_timeout().is_none());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectivityState::Online, ConnectivityState::Unknown]
        );
    }

    #[test]
    fn test_timeout_goes_offline_and_clears_handle() {
        let (mut tracker, seen) = recording_tracker();
        tracker.on_stream_start();
        assert!(fire_pending(&mut tracker));

        assert_eq!(tracker.state(), ConnectivityState::Offline);
        assert!(tracker.pending_timeout().is_none());
        assert_eq!(*seen.lock().unwrap(), vec![ConnectivityState::Offline]);
        assert_eq!(tracker.warnings_emitted(), 1);
    }

    #[test]
    fn test_set_cancels_timeout_and_stale_expiry_is_ignored() {
        let (mut tracker, seen) = recording_tracker();
        tracker.on_stream_start();
        let stale = tracker.pending_timeout().unwrap().generation();

        tracker.set(ConnectivityState::Offline);
        assert!(tracker.pending_timeout().is_none());
        assert!(!tracker.on_timeout(stale));
        assert_eq!(*seen.lock().unwrap(), vec![ConnectivityState::Offline]);
    }

    #[test]
    fn test_stale_generation_does_not_fire_new_timeout() {
        let (mut tracker, _seen) = recording_tracker();
        tracker.on_stream_start();
        let stale = tracker.pending_timeout().unwrap().generation();
        tracker.set(ConnectivityState::Online);
        tracker.on_stream_start();

        assert!(!tracker.on_timeout(stale));
        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        assert!(tracker.pending_timeout().is_some());
    }

    #[test]
    fn test_set_resets_failure_counter() {
        let (mut tracker, _seen) = recording_tracker();
        tracker.on_stream_failure("refused");
        tracker.set(ConnectivityState::Unknown);
        assert_eq!(tracker.failures(), 0);

        tracker.on_stream_failure("refused");
        assert_eq!(tracker.state(), ConnectivityState::Unknown);
    }

    #[test]
    fn test_warning_suppressed_within_episode() {
        let (mut tracker, _seen) = recording_tracker();
        tracker.on_stream_start();
        assert!(fire_pending(&mut tracker));
        assert_eq!(tracker.warnings_emitted(), 1);

        // Still failing: restart, then keep failing.
        tracker.on_stream_start();
        tracker.on_stream_failure("refused");
        tracker.on_stream_failure("refused");
        assert_eq!(tracker.state(), ConnectivityState::Offline);
        assert_eq!(tracker.warnings_emitted(), 1);
    }

    #[test]
    fn test_warning_rearmed_by_online() {
        let (mut tracker, _seen) = recording_tracker();
        tracker.on_stream_failure("refused");
        tracker.on_stream_failure("refused");
        assert_eq!(tracker.warnings_emitted(), 1);

        tracker.set(ConnectivityState::Online);
        assert!(tracker.snapshot().warning_armed);
        tracker.on_stream_failure("dropped");
        tracker.on_stream_failure("refused");
        tracker.on_stream_failure("refused");
        assert_eq!(tracker.state(), ConnectivityState::Offline);
        assert_eq!(tracker.warnings_emitted(), 2);

        tracker.on_stream_failure("refused");
        assert_eq!(tracker.warnings_emitted(), 2);
    }

    #[test]
    fn test_restart_after_offline_keeps_counter() {
        let (mut tracker, seen) = recording_tracker();
        tracker.on_stream_failure("refused");
        tracker.on_stream_failure("refused");
        tracker.on_stream_start();
        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        assert!(tracker.pending_timeout().is_some());

        tracker.on_stream_failure("refused");
        assert_eq!(tracker.state(), ConnectivityState::Offline);
        assert!(tracker.pending_timeout().is_none());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectivityState::Offline,
                ConnectivityState::Unknown,
                ConnectivityState::Offline
            ]
        );
    }

    #[test]
    fn test_custom_threshold() {
        let config = ConnectivityConfig {
            max_failures: 3,
            ..ConnectivityConfig::default()
        };
        let mut tracker = ConnectivityTracker::with_config(&config, |_| {});
        tracker.on_stream_failure("a");
        tracker.on_stream_failure("b");
        assert_eq!(tracker.state(), ConnectivityState::Unknown);
        tracker.on_stream_failure("c");
        assert_eq!(tracker.state(), ConnectivityState::Offline);
    }

    #[test]
    fn test_timeout_deadline_uses_configured_duration() {
        let config = ConnectivityConfig {
            online_timeout_ms: 250,
            ..ConnectivityConfig::default()
        };
        let mut tracker = ConnectivityTracker::with_config(&config, |_| {});
        let before = Instant::now();
        tracker.on_stream_start();
        let deadline = tracker.pending_timeout().unwrap().deadline();
        assert!(deadline >= before + Duration::from_millis(250));
    }
}
