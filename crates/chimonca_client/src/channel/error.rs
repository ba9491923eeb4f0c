//! Channel errors.

/// Failure reported by the push channel.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ChannelError {
    /// The link is down; the operation may be retried once it is back.
    #[display("Channel is not connected")]
    NotConnected,

    /// The channel was shut down and will not reconnect.
    #[display("Channel is closed")]
    Closed,

    /// The underlying transport failed.
    #[display("Transport error: {}", _0)]
    Transport(#[error(not(source))] String),

    /// The broker answered with an ERROR frame.
    #[display("Broker error: {}", _0)]
    Broker(#[error(not(source))] String),

    /// The broker broke the STOMP conversation.
    #[display("Protocol error: {}", _0)]
    Protocol(#[error(not(source))] String),
}

impl ChannelError {
    /// Whether retrying after a reconnect can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_))
    }
}
