//! Shared utilities for tracker integration tests.

use std::sync::{Arc, Mutex};

use connectivity_tracker::config::ConnectivityConfig;
use connectivity_tracker::connectivity::{ConnectivityState, TrackerHandle, TrackerService};
use connectivity_tracker::lifecycle::Shutdown;
use tokio::task::JoinHandle;

/// Every state the tracker broadcast, in order.
pub type Transitions = Arc<Mutex<Vec<ConnectivityState>>>;

/// A running tracker task plus the pieces a test needs to observe and stop it.
pub struct Harness {
    pub handle: TrackerHandle,
    pub task: JoinHandle<()>,
    pub shutdown: Shutdown,
    pub transitions: Transitions,
}

impl Harness {
    pub fn transitions(&self) -> Vec<ConnectivityState> {
        self.transitions.lock().unwrap().clone()
    }
}

/// Spawn a tracker with default thresholds that records every broadcast.
pub fn spawn_tracker() -> Harness {
    spawn_tracker_with(ConnectivityConfig::default())
}

pub fn spawn_tracker_with(config: ConnectivityConfig) -> Harness {
    let transitions: Transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = transitions.clone();
    let shutdown = Shutdown::new();

    let (handle, task) = TrackerService::spawn(
        &config,
        move |state| sink.lock().unwrap().push(state),
        shutdown.subscribe(),
    );

    Harness {
        handle,
        task,
        shutdown,
        transitions,
    }
}
