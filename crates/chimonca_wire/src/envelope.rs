//! REST response envelope.

use serde::{Deserialize, Serialize};

/// Status value the server uses for success.
const STATUS_OK: u16 = 200;

/// Envelope wrapping every REST response: `{status, message, time, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Application-level status (mirrors HTTP codes).
    pub status: u16,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Server timestamp.
    #[serde(default)]
    pub time: String,
    /// Payload, absent on failures and plain acknowledgements.
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Whether the server reported success.
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}
