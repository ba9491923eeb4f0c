//! In-process STOMP broker for tests and offline runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chimonca_wire::{StompCommand, StompFrame};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{ChannelError, Connector, Transport};

#[derive(Debug, Default)]
struct Connection {
    inbound: Option<mpsc::UnboundedSender<String>>,
    /// Subscription id to destination.
    subscriptions: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct BrokerState {
    connections: BTreeMap<u64, Connection>,
    next_connection: u64,
    connects: usize,
    refuse: bool,
    published: Vec<(String, String)>,
    message_seq: u64,
}

/// A broker living in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers a MESSAGE to every subscription on `destination`.
    /// Returns how many subscriptions received it.
    pub fn publish(&self, destination: &str, body: &str) -> usize {
        let mut state = self.lock();
        let mut delivered = 0;
        let mut seq = state.message_seq;
        for connection in state.connections.values() {
            let Some(inbound) = &connection.inbound else {
                continue;
            };
            for (id, subscribed) in &connection.subscriptions {
                if subscribed != destination {
                    continue;
                }
                seq += 1;
                let frame = StompFrame::new(StompCommand::Message)
                    .with_header("destination", destination)
                    .with_header("subscription", id.as_str())
                    .with_header("message-id", seq.to_string())
                    .with_body(body);
                if inbound.send(frame.encode()).is_ok() {
                    delivered += 1;
                }
            }
        }
        state.message_seq = seq;
        trace!(destination, delivered, "Published");
        delivered
    }

    /// Sends an ERROR frame on every open connection.
    pub fn fail_connections(&self, message: &str) {
        let state = self.lock();
        for connection in state.connections.values() {
            if let Some(inbound) = &connection.inbound {
                let frame = StompFrame::new(StompCommand::Error).with_header("message", message);
                let _ = inbound.send(frame.encode());
            }
        }
    }

    /// Drops every open connection as if the network went away.
    pub fn drop_connections(&self) {
        let mut state = self.lock();
        debug!(count = state.connections.len(), "Dropping connections");
        state.connections.clear();
    }

    /// Makes subsequent connects fail (or succeed again).
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    /// Subscriptions currently registered on `destination`.
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.lock()
            .connections
            .values()
            .flat_map(|c| c.subscriptions.values())
            .filter(|d| *d == destination)
            .count()
    }

    /// Open connections.
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Bodies clients sent with SEND, in order.
    pub fn published_by_clients(&self) -> Vec<(String, String)> {
        self.lock().published.clone()
    }

    /// Polls until `destination` has at least one subscriber.
    pub async fn wait_for_subscriber(&self, destination: &str) {
        while self.subscriber_count(destination) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn accept(&self, connection: u64, text: &str) -> Result<(), ChannelError> {
        let frame = StompFrame::decode(text)
            .map_err(|e| ChannelError::Protocol(e.to_string()))?
            .ok_or_else(|| ChannelError::Protocol("unexpected heart-beat".into()))?;

        let mut state = self.lock();
        let state = &mut *state;
        let Some(slot) = state.connections.get_mut(&connection) else {
            return Err(ChannelError::Transport("connection dropped".into()));
        };

        match frame.command {
            StompCommand::Connect => {
                let reply = StompFrame::new(StompCommand::Connected).with_header("version", "1.2");
                if let Some(inbound) = &slot.inbound {
                    let _ = inbound.send(reply.encode());
                }
            }
            StompCommand::Subscribe => {
                let id = frame.header("id").unwrap_or_default().to_owned();
                let destination = frame.header("destination").unwrap_or_default().to_owned();
                slot.subscriptions.insert(id, destination);
            }
            StompCommand::Unsubscribe => {
                if let Some(id) = frame.header("id") {
                    slot.subscriptions.remove(id);
                }
            }
            StompCommand::Send => {
                let destination = frame.header("destination").unwrap_or_default().to_owned();
                state.published.push((destination, frame.body));
            }
            StompCommand::Disconnect => {
                state.connections.remove(&connection);
            }
            other => {
                return Err(ChannelError::Protocol(format!(
                    "client sent {}",
                    other.as_ref()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn Transport>, ChannelError> {
        let mut state = self.lock();
        if state.refuse {
            return Err(ChannelError::Transport("connection refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.next_connection;
        state.next_connection += 1;
        state.connects += 1;
        state.connections.insert(
            id,
            Connection {
                inbound: Some(tx),
                subscriptions: BTreeMap::new(),
            },
        );
        drop(state);
        debug!(connection = id, "Memory connection opened");
        Ok(Box::new(MemoryTransport {
            broker: self.clone(),
            connection: id,
            inbound: rx,
        }))
    }
}

struct MemoryTransport {
    broker: MemoryBroker,
    connection: u64,
    inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<(), ChannelError> {
        self.broker.accept(self.connection, &text)
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.broker.lock().connections.remove(&self.connection);
    }
}
