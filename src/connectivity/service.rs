//! Single-owner task driving a [`ConnectivityTracker`].
//!
//! # Responsibilities
//! - Own the tracker on one task so every entry point runs serialized
//! - Turn the pending online timeout into a `sleep_until` branch of the loop
//! - Mirror the current state into a watch channel for async observers
//!
//! # Design Decisions
//! - Timer expiry re-enters the same loop as commands, never a separate task
//! - The loop exits on shutdown or once every handle is dropped; the tracker
//!   and its pending timeout are dropped with it

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::ConnectivityConfig;
use crate::connectivity::tracker::{ConnectivityTracker, PendingTimeout};
use crate::connectivity::types::{ConnectivityState, TrackerError, TrackerResult, TrackerSnapshot};

enum Command {
    StreamStarted,
    StreamFailed(String),
    Override(ConnectivityState),
    Snapshot(oneshot::Sender<TrackerSnapshot>),
}

/// Cloneable handle used by the connection manager to feed the tracker.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    commands: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectivityState>,
}

impl TrackerHandle {
    /// A new stream attempt has begun.
    pub async fn notify_stream_started(&self) -> TrackerResult<()> {
        self.send(Command::StreamStarted).await
    }

    /// The most recent stream attempt failed.
    pub async fn notify_stream_failed(&self, cause: impl Into<String>) -> TrackerResult<()> {
        self.send(Command::StreamFailed(cause.into())).await
    }

    /// Force the tracker into `state`.
    pub async fn override_state(&self, state: ConnectivityState) -> TrackerResult<()> {
        self.send(Command::Override(state)).await
    }

    /// Fetch the tracker internals, ordered after every previously sent notification.
    pub async fn snapshot(&self) -> TrackerResult<TrackerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| TrackerError::Closed)
    }

    /// Last broadcast state.
    pub fn state(&self) -> ConnectivityState {
        *self.state_rx.borrow()
    }

    /// Watch the broadcast state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_rx.clone()
    }

    async fn send(&self, command: Command) -> TrackerResult<()> {
        self.commands.send(command).await.map_err(|_| TrackerError::Closed)
    }
}

/// Owns the tracker and processes commands and timeouts in order.
pub struct TrackerService {
    tracker: ConnectivityTracker,
    commands: mpsc::Receiver<Command>,
}

impl TrackerService {
    /// Build the service and its handle without starting it.
    ///
    /// `on_state_changed` runs on the service task for every actual change.
    pub fn new<F>(config: &ConnectivityConfig, mut on_state_changed: F) -> (Self, TrackerHandle)
    where
        F: FnMut(ConnectivityState) + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectivityState::Unknown);

        let tracker = ConnectivityTracker::with_config(config, move |state| {
            state_tx.send_replace(state);
            on_state_changed(state);
        });

        let service = Self {
            tracker,
            commands: command_rx,
        };
        let handle = TrackerHandle {
            commands: command_tx,
            state_rx,
        };
        (service, handle)
    }

    /// Build the service and run it on a new tokio task.
    pub fn spawn<F>(
        config: &ConnectivityConfig,
        on_state_changed: F,
        shutdown: broadcast::Receiver<()>,
    ) -> (TrackerHandle, JoinHandle<()>)
    where
        F: FnMut(ConnectivityState) + Send + 'static,
    {
        let (service, handle) = Self::new(config, on_state_changed);
        let task = tokio::spawn(service.run(shutdown));
        (handle, task)
    }

    /// Run until shutdown is signalled or every handle is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Connectivity tracker started");

        loop {
            let pending = self.tracker.pending_timeout();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        tracing::info!("All tracker handles dropped, stopping");
                        break;
                    }
                },
                Some(generation) = wait_for(pending) => {
                    self.tracker.on_timeout(generation);
                }
                _ = shutdown.recv() => {
                    tracing::info!("Connectivity tracker received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::StreamStarted => self.tracker.on_stream_start(),
            Command::StreamFailed(cause) => self.tracker.on_stream_failure(&cause),
            Command::Override(state) => self.tracker.set(state),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.tracker.snapshot());
            }
        }
    }
}

/// Resolve with the timeout's generation once its deadline passes; never resolves if none is pending.
async fn wait_for(pending: Option<PendingTimeout>) -> Option<u64> {
    match pending {
        Some(pending) => {
            time::sleep_until(pending.deadline()).await;
            Some(pending.generation())
        }
        None => std::future::pending().await,
    }
}
