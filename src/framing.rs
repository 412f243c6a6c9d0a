//! Newline-delimited JSON framing for the stdio channel.
//!
//! One message per line. The bridge only cares about the `id` field of a
//! message; `method`, `params`, `result` and everything else pass through
//! untouched.

use std::fmt;

use serde_json::Value as JsonValue;

use crate::{Error, Result};

/// An opaque protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message(JsonValue);

impl Message {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// The message id, if present. A `null` id counts as absent.
    pub fn id(&self) -> Option<&JsonValue> {
        match self.0.get("id") {
            None | Some(JsonValue::Null) => None,
            Some(id) => Some(id),
        }
    }

    /// Set the message id. No-op when the payload is not a JSON object.
    pub fn with_id(mut self, id: JsonValue) -> Self {
        if let JsonValue::Object(map) = &mut self.0 {
            map.insert("id".to_string(), id);
        }
        self
    }

    pub fn into_value(self) -> JsonValue {
        self.0
    }
}

/// Correlation key derived from a message id.
///
/// JSON-RPC ids may be numbers or strings, so the canonical JSON text of
/// the id value is used as the key; `1` and `"1"` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn from_value(id: &JsonValue) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded line from the subprocess.
#[derive(Debug)]
pub enum Frame {
    Message(Message),
    /// Blank or whitespace-only line. Not an error; the reader skips it.
    Empty,
}

/// Encode a message as its canonical JSON followed by a single newline.
pub fn encode_line(message: &Message) -> Result<String> {
    let mut line = serde_json::to_string(&message.0)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line into a [`Frame`].
pub fn decode_line(line: &str) -> Result<Frame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Frame::Empty);
    }
    let value: JsonValue = serde_json::from_str(trimmed)
        .map_err(|e| Error::Framing(format!("{e}: {trimmed}")))?;
    Ok(Frame::Message(Message::new(value)))
}
