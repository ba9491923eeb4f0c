//! Push channel: a STOMP session over a reconnecting transport.
//!
//! One [`ChannelClient`] owns one background connection task. Subscriptions
//! survive reconnects: the task re-issues every live SUBSCRIBE once the link
//! is back and tells each subscriber with [`ChannelEvent::Broken`] and
//! [`ChannelEvent::Restored`].

mod error;
mod memory;
mod task;
mod transport;
mod websocket;

pub use error::ChannelError;
pub use memory::MemoryBroker;
pub use transport::{Connector, Transport};
pub use websocket::WebSocketConnector;

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use derive_setters::Setters;
use futures::Stream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use task::Command;

/// Connection lifecycle as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ConnectionState {
    /// `connect` has not been called yet.
    #[display("idle")]
    Idle,
    /// Opening the transport or waiting for CONNECTED.
    #[display("connecting")]
    Connecting,
    /// STOMP session established.
    #[display("connected")]
    Connected,
    /// Link lost; a reconnect is scheduled.
    #[display("disconnected")]
    Disconnected,
    /// Shut down for good.
    #[display("closed")]
    Closed,
}

/// Channel tuning.
#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct ChannelConfig {
    /// Value of the CONNECT `host` header.
    #[setters(into)]
    host: String,
    /// Fixed delay between reconnect attempts.
    reconnect_delay: Duration,
    /// How long to wait for CONNECTED after the transport opened.
    handshake_timeout: Duration,
    /// How long `disconnect` waits for the task before aborting it.
    shutdown_timeout: Duration,
    #[setters(skip)]
    connect_headers: Vec<(String, String)>,
}

impl ChannelConfig {
    /// Creates a config with default timings.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            reconnect_delay: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(2),
            connect_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every CONNECT frame.
    #[must_use]
    pub fn with_connect_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.connect_headers.push((name.into(), value.into()));
        self
    }

    /// Reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }
}

/// What a subscriber sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A MESSAGE for this subscription.
    Message {
        /// Destination the broker delivered to.
        destination: String,
        /// Raw frame body.
        body: String,
    },
    /// The link dropped; the subscription will be restored on reconnect.
    Broken,
    /// The link is back and the subscription was re-issued.
    Restored,
}

/// Read side of the connection state.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Current state.
    pub fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits for the next state change; `None` once the client is gone.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }

    /// Waits until the STOMP session is up.
    pub async fn wait_connected(&mut self, timeout: Duration) -> Result<(), ChannelError> {
        let waited = tokio::time::timeout(timeout, self.state.wait_for(|s| {
            matches!(s, ConnectionState::Connected | ConnectionState::Closed)
        }))
        .await;
        match waited {
            Ok(Ok(state)) if *state == ConnectionState::Connected => Ok(()),
            Ok(_) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::NotConnected),
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    destination: String,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    /// Destination this subscription listens on.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Next event; `None` once the channel shut down.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }
}

impl Stream for Subscription {
    type Item = ChannelEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe {
            id: std::mem::take(&mut self.id),
        });
    }
}

/// Client side of the push channel.
pub struct ChannelClient {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelClient")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ChannelClient {
    /// Creates an idle client.
    pub fn new(connector: Arc<dyn Connector>, config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            connector,
            config,
            state: Arc::new(state),
            commands: None,
            task: None,
            next_subscription: AtomicU64::new(0),
        }
    }

    /// Starts the connection task. Calling it again while the task runs
    /// only returns another handle.
    #[instrument(skip(self), fields(host = %self.config.host))]
    pub fn connect(&mut self) -> ConnectionHandle {
        let running = self.task.as_ref().is_some_and(|t| !t.is_finished());
        if running {
            debug!("Channel already started");
        } else {
            info!("Starting channel");
            let (tx, rx) = mpsc::unbounded_channel();
            self.state.send_replace(ConnectionState::Connecting);
            self.task = Some(tokio::spawn(task::run(
                Arc::clone(&self.connector),
                self.config.clone(),
                rx,
                Arc::clone(&self.state),
            )));
            self.commands = Some(tx);
        }
        self.connection()
    }

    /// Watches the connection state.
    pub fn connection(&self) -> ConnectionHandle {
        ConnectionHandle {
            state: self.state.subscribe(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to a destination.
    ///
    /// While connected, returns after the SUBSCRIBE frame was written. While
    /// the link is down the subscription is queued and issued on reconnect.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, destination: &str) -> Result<Subscription, ChannelError> {
        let commands = self.commands.as_ref().ok_or(ChannelError::Closed)?;
        let id = format!(
            "sub-{}",
            self.next_subscription.fetch_add(1, Ordering::Relaxed)
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        commands
            .send(Command::Subscribe {
                id: id.clone(),
                destination: destination.to_owned(),
                events: events_tx,
                ready: ready_tx,
            })
            .map_err(|_| ChannelError::Closed)?;
        ready_rx.await.map_err(|_| ChannelError::Closed)?;
        debug!(id = %id, "Subscribed");
        Ok(Subscription {
            id,
            destination: destination.to_owned(),
            events: events_rx,
            commands: commands.clone(),
        })
    }

    /// Publishes a body. Fails fast with [`ChannelError::NotConnected`]
    /// while the link is down.
    #[instrument(skip(self, body))]
    pub fn send(&self, destination: &str, body: impl Into<String>) -> Result<(), ChannelError> {
        let commands = self.commands.as_ref().ok_or(ChannelError::Closed)?;
        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::Closed => return Err(ChannelError::Closed),
            _ => return Err(ChannelError::NotConnected),
        }
        commands
            .send(Command::Send {
                destination: destination.to_owned(),
                body: body.into(),
            })
            .map_err(|_| ChannelError::Closed)
    }

    /// Shuts the connection down. Outstanding subscriptions end.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Disconnect);
        }
        let Some(mut task) = self.task.take() else {
            return;
        };
        match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
            Ok(_) => debug!("Channel task finished"),
            Err(_) => {
                warn!("Channel task did not stop in time, aborting");
                task.abort();
            }
        }
        self.state.send_replace(ConnectionState::Closed);
        info!("Channel closed");
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
