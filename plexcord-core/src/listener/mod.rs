//! Alert listener
//!
//! One [`AlertListener`] follows one configured server for one account. It
//! is an actor: a single task owns the connection, the debounce state and
//! both timers, and consumes every input from one channel:
//!
//! - alerts pumped from the server's notification stream
//! - the end of that stream
//! - update-staleness and connection-liveness expiries
//!
//! Because nothing else touches the state, a timer expiry can never race
//! with an alert that is cancelling it. Events from a torn-down connection
//! or a cancelled timer carry an old epoch or generation and are dropped.
//!
//! ```text
//!   Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!        ▲                        │                  │
//!        └──── retry in 10s ◀─────┘ transient        │ transport lost /
//!        ▲                        │                  │ probe failed
//!        │                        └──fatal──▶ Stopped│
//!        └───────────────────── disconnect ◀─────────┘
//! ```

mod processor;
mod supervisor;

#[cfg(test)]
pub(crate) mod mock;

pub use processor::Disposition;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{ConfigStore, ServerConfig};
use crate::debounce::DebounceTracker;
use crate::error::{Error, Result};
use crate::presence::PresencePublisher;
use crate::server::{MediaServer, ServerDirectory};
use crate::session::SessionResolver;
use crate::timer::TimeoutMonitor;

/// Delay before retrying a failed connection
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

const EVENT_BUFFER: usize = 64;

/// Input to the listener loop
#[derive(Debug)]
pub(crate) enum ListenerEvent {
    /// Raw notification from the connection opened in `epoch`
    Alert { epoch: u64, data: Value },
    /// The notification stream of `epoch` failed or ended
    TransportLost { epoch: u64, error: Error },
    /// Update-staleness countdown expired
    UpdateTimeout(u64),
    /// Connection-liveness countdown expired
    ConnectionTimeout(u64),
}

/// Connection lifecycle, observable through [`ListenerHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The listener has exited and will not reconnect
    Stopped,
}

/// What a listener is started with
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub server: ServerConfig,
    /// Image lookup base URL, if it could be fetched
    pub images_url: Option<String>,
}

/// Caller's side of a spawned listener
pub struct ListenerHandle {
    id: String,
    shutdown: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<Result<()>>,
}

impl ListenerHandle {
    /// Short tag used in this listener's log span
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver for connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Ask the listener to stop. Returns immediately.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the listener to exit.
    ///
    /// Returns the fatal error that ended it, if any.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Transport(format!("listener task failed: {}", e)))?
    }

    /// Stop and wait
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}

/// Follows one server's alerts and mirrors them to a presence channel.
pub struct AlertListener {
    id: String,
    settings: ListenerSettings,
    config: Arc<ConfigStore>,
    directory: Arc<dyn ServerDirectory>,
    publisher: Box<dyn PresencePublisher>,
    server: Option<Arc<dyn MediaServer>>,
    resolver: SessionResolver,
    tracker: DebounceTracker,
    timers: TimeoutMonitor,
    events: mpsc::Sender<ListenerEvent>,
    pump: Option<JoinHandle<()>>,
    epoch: u64,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl AlertListener {
    /// Start a listener on its own task.
    ///
    /// The task runs inside a `listener` span carrying the server name and
    /// the handle's id.
    pub fn spawn(
        settings: ListenerSettings,
        directory: Arc<dyn ServerDirectory>,
        publisher: Box<dyn PresencePublisher>,
        config: Arc<ConfigStore>,
    ) -> ListenerHandle {
        let (listener, events) = Self::new(settings, directory, publisher, config);

        let id = listener.id.clone();
        let shutdown = listener.shutdown.clone();
        let state = listener.state.subscribe();
        let span = tracing::info_span!(
            "listener",
            server = %listener.settings.server.name,
            id = %id
        );
        let task = tokio::spawn(listener.run(events).instrument(span));

        ListenerHandle {
            id,
            shutdown,
            state,
            task,
        }
    }

    pub(crate) fn new(
        settings: ListenerSettings,
        directory: Arc<dyn ServerDirectory>,
        publisher: Box<dyn PresencePublisher>,
        config: Arc<ConfigStore>,
    ) -> (Self, mpsc::Receiver<ListenerEvent>) {
        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let listener = Self {
            id: listener_id(),
            settings,
            config,
            directory,
            publisher,
            server: None,
            resolver: SessionResolver::new(false, String::new()),
            tracker: DebounceTracker::new(),
            timers: TimeoutMonitor::new(),
            events,
            pump: None,
            epoch: 0,
            state,
            shutdown: CancellationToken::new(),
        };
        (listener, receiver)
    }

    async fn run(mut self, mut events: mpsc::Receiver<ListenerEvent>) -> Result<()> {
        let result = self.event_loop(&mut events).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Listener stopped");
        }
        self.disconnect().await;
        self.set_state(ConnectionState::Stopped);
        result
    }

    async fn event_loop(&mut self, events: &mut mpsc::Receiver<ListenerEvent>) -> Result<()> {
        if !self.connect().await? {
            return Ok(());
        }

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    /// Apply one event.
    ///
    /// Only fatal errors are returned; everything else is logged here.
    pub(crate) async fn handle_event(&mut self, event: ListenerEvent) -> Result<()> {
        match event {
            ListenerEvent::Alert { epoch, data } => {
                if epoch != self.epoch {
                    return Ok(());
                }
                match self.process_alert(&data).await {
                    Ok(disposition) => {
                        tracing::debug!(?disposition, "Alert handled");
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::error!(error = %e, alert = %data, "Failed to handle alert");
                    }
                }
            }
            ListenerEvent::TransportLost { epoch, error } => {
                if epoch == self.epoch {
                    self.reconnect(error).await?;
                }
            }
            ListenerEvent::UpdateTimeout(generation) => {
                if self.timers.update.fired(generation) {
                    self.on_update_timeout().await;
                }
            }
            ListenerEvent::ConnectionTimeout(generation) => {
                if self.timers.connection.fired(generation) {
                    self.on_connection_timeout().await?;
                }
            }
        }
        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// Five upper-case hex digits
fn listener_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..5].to_uppercase()
}
