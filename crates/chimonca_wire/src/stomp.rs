//! STOMP 1.2 frames carried as WebSocket text messages.
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```

use std::str::FromStr;

use tracing::{instrument, trace};

use crate::WireError;

/// Frame terminator.
const NUL: char = '\0';

/// Commands understood by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum StompCommand {
    /// Client handshake.
    Connect,
    /// Broker handshake reply.
    Connected,
    /// Register interest in a destination.
    Subscribe,
    /// Drop a subscription.
    Unsubscribe,
    /// Publish to a destination.
    Send,
    /// Broker delivery for a subscription.
    Message,
    /// Broker acknowledgement of a `receipt` header.
    Receipt,
    /// Broker-side failure; the connection is closed afterwards.
    Error,
    /// Graceful client shutdown.
    Disconnect,
}

impl StompCommand {
    /// CONNECT and CONNECTED frames do not escape header values.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Frame command.
    pub command: StompCommand,
    /// Headers in wire order; the first occurrence of a name wins.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: String,
}

impl StompFrame {
    /// Creates a frame with no headers and an empty body.
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// CONNECT frame for the given virtual host and extra headers.
    pub fn connect<'a>(host: &str, extra: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        let frame = Self::new(StompCommand::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0");
        extra
            .into_iter()
            .fold(frame, |frame, (name, value)| frame.with_header(name, value))
    }

    /// SUBSCRIBE frame.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// UNSUBSCRIBE frame.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    /// SEND frame with a JSON body.
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(StompCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// DISCONNECT frame.
    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// Serializes the frame, adding `content-length` when a body is present.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_ref());
        out.push('\n');
        for (name, value) in &self.headers {
            push_header(&mut out, name, value, escape);
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            push_header(&mut out, "content-length", &self.body.len().to_string(), false);
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }

    /// Parses one frame from a WebSocket text message.
    ///
    /// Returns `Ok(None)` for heart-beats (bare end-of-line).
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownCommand`] or [`WireError::MalformedFrame`].
    #[instrument(skip(text), fields(len = text.len()))]
    pub fn decode(text: &str) -> Result<Option<Self>, WireError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            trace!("Heart-beat");
            return Ok(None);
        }

        let (command_line, mut rest) = split_line(text)
            .ok_or_else(|| WireError::MalformedFrame("missing command line".to_string()))?;
        let command = StompCommand::from_str(command_line)
            .map_err(|_| WireError::UnknownCommand(command_line.to_string()))?;

        let mut frame = Self::new(command);
        loop {
            let (line, next) = split_line(rest)
                .ok_or_else(|| WireError::MalformedFrame("unterminated headers".to_string()))?;
            rest = next;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| WireError::MalformedFrame(format!("header without colon: {line}")))?;
            let (name, value) = if command.escapes_headers() {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };
            frame.headers.push((name, value));
        }

        frame.body = match frame.header("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| WireError::MalformedFrame(format!("bad content-length: {len}")))?;
                let body = rest
                    .get(..len)
                    .ok_or_else(|| WireError::MalformedFrame("body shorter than content-length".to_string()))?;
                if !rest[len..].starts_with(NUL) {
                    return Err(WireError::MalformedFrame("missing frame terminator".to_string()));
                }
                body.to_string()
            }
            None => {
                let end = rest
                    .find(NUL)
                    .ok_or_else(|| WireError::MalformedFrame("missing frame terminator".to_string()))?;
                rest[..end].to_string()
            }
        };

        trace!(command = ?frame.command, headers = frame.headers.len(), "Decoded STOMP frame");
        Ok(Some(frame))
    }
}

/// Splits off one line, accepting LF or CRLF endings.
fn split_line(text: &str) -> Option<(&str, &str)> {
    let end = text.find('\n')?;
    let line = text[..end].strip_suffix('\r').unwrap_or(&text[..end]);
    Some((line, &text[end + 1..]))
}

fn push_header(out: &mut String, name: &str, value: &str, escape: bool) {
    if escape {
        out.push_str(&escape_value(name));
        out.push(':');
        out.push_str(&escape_value(value));
    } else {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
    }
    out.push('\n');
}

fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, WireError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(WireError::MalformedFrame(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}
