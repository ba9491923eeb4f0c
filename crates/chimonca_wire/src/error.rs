//! Wire decode/encode errors.

/// Error raised while decoding or encoding data at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum WireError {
    /// The payload was not valid JSON for the expected shape.
    #[display("Malformed JSON payload: {}", _0)]
    Json(#[error(not(source))] String),

    /// A STOMP frame named a command this client does not speak.
    #[display("Unknown STOMP command: {}", _0)]
    UnknownCommand(#[error(not(source))] String),

    /// A STOMP frame was structurally broken.
    #[display("Malformed STOMP frame: {}", _0)]
    MalformedFrame(#[error(not(source))] String),

    /// A field map referenced a slot outside 1..=6.
    #[display("Invalid field slot: {}", _0)]
    InvalidSlot(#[error(not(source))] String),

    /// A match-success body did not carry a room identifier.
    #[display("Invalid room identifier: {}", _0)]
    InvalidRoomId(#[error(not(source))] String),
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
