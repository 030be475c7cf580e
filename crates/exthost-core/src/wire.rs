//! JSON envelopes exchanged with extensions.
//!
//! Inbound frames are `{command, requestId?, ...fields}`. Outbound frames are
//! tagged by `kind`: `"callback"` for a correlated reply and
//! `"notify-<topic>"` for a bus notification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command that binds a channel to its claimed origin.
pub const HANDSHAKE_COMMAND: &str = "registerExtension";

/// `kind` of a correlated reply.
pub const CALLBACK_KIND: &str = "callback";

/// Prefix of every notification `kind`.
pub const NOTIFY_PREFIX: &str = "notify-";

/// Errors raised while decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Frame is not valid JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is JSON but lacks a string `command`.
    #[error("missing command")]
    MissingCommand,
}

/// One inbound command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Command name.
    pub command: String,
    /// Caller-chosen correlation id, echoed back in the callback.
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    /// Command-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl InboundMessage {
    /// Build a message from a command name and its fields.
    #[must_use]
    pub fn new(command: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            request_id: None,
            fields,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<Value>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.get("command").is_some_and(Value::is_string) {
            return Err(WireError::MissingCommand);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Whether the caller asked for a callback.
    ///
    /// `null`, `""`, `0` and `false` count as absent.
    pub fn has_request_id(&self) -> bool {
        self.request_id.as_ref().is_some_and(is_truthy)
    }

    /// Whether this is the binding handshake.
    pub fn is_handshake(&self) -> bool {
        self.command == HANDSHAKE_COMMAND
    }

    /// Command fields as one JSON object, for typed deserialization.
    #[must_use]
    pub fn params(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Correlated reply to a command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackEnvelope {
    /// Always `"callback"`.
    pub kind: String,
    /// The caller's correlation id.
    pub request_id: Value,
    /// Handler result: a status record or an arbitrary value.
    pub result: Value,
}

impl CallbackEnvelope {
    /// Build a callback for `request_id`.
    #[must_use]
    pub fn new(request_id: Value, result: Value) -> Self {
        Self {
            kind: CALLBACK_KIND.to_owned(),
            request_id,
            result,
        }
    }
}

/// Bus notification for one topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    /// `"notify-"` followed by the topic.
    pub kind: String,
    /// Positional notification arguments.
    pub args: Vec<Value>,
}

impl NotificationEnvelope {
    /// Build a notification for `topic`.
    #[must_use]
    pub fn new(topic: &str, args: Vec<Value>) -> Self {
        Self {
            kind: format!("{NOTIFY_PREFIX}{topic}"),
            args,
        }
    }

    /// The topic this notification belongs to.
    pub fn topic(&self) -> Option<&str> {
        self.kind.strip_prefix(NOTIFY_PREFIX)
    }
}
