//! Messages and events emitted by checks.

use crate::Status;
use serde::{Deserialize, Serialize};

/// One observation in a check's output.
///
/// `code` is short and check-local; a check never reuses a code for two
/// different observations, which is what makes overrides addressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Check-local identifier
    pub code: String,

    /// Human readable text
    pub text: String,
}

impl Message {
    /// Create a new message.
    pub fn new(code: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            text: text.into(),
        }
    }

    /// Report representation: `{"code": .., "message": ..}`.
    pub fn get_data(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code,
            "message": self.text,
        })
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [code: {}]", self.text, self.code)
    }
}

/// Payload of an event: a coded [`Message`] or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventMessage {
    /// Addressable message with a code
    Coded(Message),
    /// Plain text without a code
    Text(String),
}

impl EventMessage {
    /// The message code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            EventMessage::Coded(message) => Some(&message.code),
            EventMessage::Text(_) => None,
        }
    }

    /// The message text.
    pub fn text(&self) -> &str {
        match self {
            EventMessage::Coded(message) => &message.text,
            EventMessage::Text(text) => text,
        }
    }

    /// Report representation.
    pub fn get_data(&self) -> serde_json::Value {
        match self {
            EventMessage::Coded(message) => message.get_data(),
            EventMessage::Text(text) => serde_json::Value::String(text.clone()),
        }
    }
}

impl From<Message> for EventMessage {
    fn from(message: Message) -> Self {
        EventMessage::Coded(message)
    }
}

impl From<String> for EventMessage {
    fn from(text: String) -> Self {
        EventMessage::Text(text)
    }
}

impl From<&str> for EventMessage {
    fn from(text: &str) -> Self {
        EventMessage::Text(text.to_string())
    }
}

impl std::fmt::Display for EventMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventMessage::Coded(message) => message.fmt(f),
            EventMessage::Text(text) => f.write_str(text),
        }
    }
}

/// A `(Status, message)` pair in a check's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Reported status
    pub status: Status,

    /// Payload
    pub message: EventMessage,

    /// Status before an override rewrote it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overridden_from: Option<Status>,
}

impl Event {
    /// Create an event.
    pub fn new(status: Status, message: impl Into<EventMessage>) -> Self {
        Self {
            status,
            message: message.into(),
            overridden_from: None,
        }
    }

    /// Create an event with a coded message.
    pub fn coded(status: Status, code: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(status, Message::new(code, text))
    }

    /// Report representation: `{"status": .., "message": ..}`.
    pub fn get_data(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status.name(),
            "message": self.message.get_data(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coded_event_data_shape() {
        let event = Event::coded(Status::Fail, "x", "Something is off");
        assert_eq!(
            event.get_data(),
            serde_json::json!({
                "status": "FAIL",
                "message": {"code": "x", "message": "Something is off"},
            })
        );
    }

    #[test]
    fn test_text_event_data_shape() {
        let event = Event::new(Status::Pass, "fine");
        assert_eq!(
            event.get_data(),
            serde_json::json!({"status": "PASS", "message": "fine"})
        );
        assert_eq!(event.message.code(), None);
    }

    #[test]
    fn test_message_display_includes_code() {
        let message = Message::new("bad-size", "File is too large");
        assert_eq!(message.to_string(), "File is too large [code: bad-size]");
    }
}
