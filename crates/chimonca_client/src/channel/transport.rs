//! Transport seam between the STOMP channel and the network.

use async_trait::async_trait;

use super::ChannelError;

/// A connected, bidirectional text transport carrying STOMP frames.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text message.
    async fn send(&mut self, text: String) -> Result<(), ChannelError>;

    /// Receives the next text message; `None` once the peer closed the link.
    ///
    /// Must be cancel-safe: the connection task polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String, ChannelError>>;

    /// Closes the link.
    async fn close(&mut self);
}

/// Opens fresh transports; called on first connect and on every reconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new transport.
    async fn connect(&self) -> Result<Box<dyn Transport>, ChannelError>;
}
