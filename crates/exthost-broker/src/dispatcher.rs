//! Command registry and dispatch.
//!
//! Every command has one handler with a typed parameter struct. Dispatch
//! decodes the message fields into that struct, runs the handler in its own
//! task under a reply timeout and, when the caller supplied a request id and
//! the handler produced something, sends the correlated callback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use exthost_core::{CallbackEnvelope, ExtensionError, InboundMessage, Status};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::channel::ExtensionChannel;
use crate::context::BrokerContext;
use crate::origins::Origin;

/// Handlers slower than this are logged.
const SLOW_HANDLER: Duration = Duration::from_secs(5);

/// What a handler produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Nothing to send back.
    Empty,
    /// A status record.
    Status(Status),
    /// An arbitrary JSON result.
    Value(Value),
}

impl Reply {
    /// `OK`.
    pub fn ok() -> Self {
        Self::Status(Status::ok())
    }

    /// JSON sent as the callback `result`, if any.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Status(status) => Some(status.to_value()),
            Self::Value(value) => Some(value.clone()),
        }
    }

    /// The status, if this reply is one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Status(status) => Some(status),
            _ => None,
        }
    }
}

impl From<ExtensionError> for Reply {
    fn from(err: ExtensionError) -> Self {
        Self::Status(err.into())
    }
}

impl From<Status> for Reply {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

/// Per-call view handed to a handler.
pub struct CallContext {
    /// Calling channel.
    pub channel: Arc<ExtensionChannel>,
    /// Origin the channel is bound to.
    pub origin: Origin,
    /// Command being handled.
    pub command: String,
    /// Broker tables and collaborators.
    pub broker: Arc<BrokerContext>,
}

/// Trait implemented by every command handler.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Message fields, decoded before the handler runs.
    type Params: DeserializeOwned + Send;

    /// Execute the command.
    async fn handle(&self, params: Self::Params, call: &CallContext) -> Result<Reply, ExtensionError>;
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call(&self, params: Value, call: &CallContext) -> Result<Reply, ExtensionError>;
}

struct Typed<H>(H);

#[async_trait]
impl<H: CommandHandler> ErasedHandler for Typed<H> {
    async fn call(&self, params: Value, call: &CallContext) -> Result<Reply, ExtensionError> {
        let params = decode_params::<H::Params>(&call.command, &params)?;
        self.0.handle(params, call).await
    }
}

/// Decode message fields into `T`, mapping failures onto the status vocabulary.
///
/// `serde_json` reports a missing field as ``missing field `x` `` and a type
/// mismatch as `invalid type: <got>, expected <want>`, without saying which
/// field. Fields are visited in key order and decoding stops at the first
/// mismatch, so the culprit is the last key of the shortest prefix of the
/// object that still fails with a type error.
fn decode_params<T: DeserializeOwned>(command: &str, params: &Value) -> Result<T, ExtensionError> {
    let err = match T::deserialize(params) {
        Ok(decoded) => return Ok(decoded),
        Err(err) => err,
    };
    let message = err.to_string();
    if let Some(rest) = message.strip_prefix("missing field `") {
        let name = rest.split('`').next().unwrap_or(rest);
        return Err(ExtensionError::bad_arg(name, "required"));
    }
    if let Some((actual, expected)) = message
        .strip_prefix("invalid type: ")
        .and_then(|rest| rest.split_once(", expected "))
    {
        let expected = typeof_expected(expected);
        if let Some((name, value)) = mistyped_field::<T>(params) {
            // the mismatch may sit inside a container
            let got = match value {
                Value::Object(_) | Value::Array(_) => typeof_unexpected(actual),
                _ => json_type_name(value),
            };
            return Err(ExtensionError::bad_arg_type(name, got, expected));
        }
    }
    Err(ExtensionError::bad_arg(command, message))
}

fn mistyped_field<'a, T: DeserializeOwned>(params: &'a Value) -> Option<(&'a str, &'a Value)> {
    let fields = params.as_object()?;
    let mut prefix = serde_json::Map::new();
    for (name, value) in fields {
        let _ = prefix.insert(name.clone(), value.clone());
        if let Err(err) = T::deserialize(&Value::Object(prefix.clone())) {
            if err.to_string().starts_with("invalid type: ") {
                return Some((name.as_str(), value));
            }
        }
    }
    None
}

/// `typeof` name for serde's description of what it wanted.
fn typeof_expected(expected: &str) -> &'static str {
    match expected {
        "a string" | "a borrowed string" | "a character" | "string" | "char" => "string",
        "a boolean" | "bool" => "boolean",
        "u8" | "u16" | "u32" | "u64" | "u128" | "usize" | "i8" | "i16" | "i32" | "i64" | "i128"
        | "isize" | "f32" | "f64" | "an integer" | "a number" => "number",
        other if other.starts_with("enum ") || other == "variant identifier" => "string",
        _ => "object",
    }
}

/// `typeof` name for serde's description of the value it got.
fn typeof_unexpected(actual: &str) -> &'static str {
    if actual.starts_with("boolean") {
        "boolean"
    } else if actual.starts_with("integer") || actual.starts_with("floating point") {
        "number"
    } else if actual.starts_with("string") {
        "string"
    } else {
        "object"
    }
}

/// JavaScript `typeof`-style name of a JSON value.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Null | Value::Array(_) | Value::Object(_) => "object",
    }
}

/// Command name → handler.
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn ErasedHandler>>,
    timeout: Duration,
}

impl CommandRegistry {
    /// Empty registry with a per-handler time limit.
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    /// Register `handler` for `command`. A later registration replaces an
    /// earlier one.
    pub fn register<H: CommandHandler + 'static>(&mut self, command: &str, handler: H) {
        debug_assert!(!command.is_empty(), "command name must not be empty");
        if self
            .handlers
            .insert(command.to_owned(), Arc::new(Typed(handler)))
            .is_some()
        {
            debug!(command, "replacing command handler");
        }
    }

    /// Whether `command` has a handler.
    pub fn has_command(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handle one message from `channel`.
    ///
    /// Messages on an unbound channel are dropped. The reply is also returned
    /// to the caller for logging and tests.
    pub async fn dispatch(
        &self,
        broker: &Arc<BrokerContext>,
        channel: &Arc<ExtensionChannel>,
        message: InboundMessage,
    ) -> Reply {
        let Some(origin) = channel.origin().cloned() else {
            warn!(channel = %channel.id(), command = %message.command, "dropping message on unbound channel");
            return Reply::Empty;
        };
        let command = message.command.clone();
        debug!(channel = %channel.id(), origin = %origin, command = %command, "dispatching command");

        let reply = match self.handlers.get(&command) {
            None => ExtensionError::not_supported(&command).into(),
            Some(_) if !broker.enabled.is_enabled() => ExtensionError::permission_denied().into(),
            Some(handler) => {
                let call = Arc::new(CallContext {
                    channel: Arc::clone(channel),
                    origin,
                    command: command.clone(),
                    broker: Arc::clone(broker),
                });
                self.run(Arc::clone(handler), message.params(), call).await
            }
        };

        if message.has_request_id() {
            if let (Some(result), Some(request_id)) = (reply.to_value(), message.request_id.clone()) {
                let _ = channel.send_json(&CallbackEnvelope::new(request_id, result));
            }
        }
        reply
    }

    /// Run `handler` in its own task and wait up to the registry timeout.
    ///
    /// A handler that outlives the timeout is left running; only the reply is
    /// given up.
    async fn run(&self, handler: Arc<dyn ErasedHandler>, params: Value, call: Arc<CallContext>) -> Reply {
        let start = Instant::now();
        let command = call.command.clone();
        let task = tokio::spawn(async move { handler.call(params, &call).await });
        let reply = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(reply))) => reply,
            Ok(Ok(Err(err))) => err.into(),
            Ok(Err(join_err)) => {
                error!(command = %command, error = %join_err, "handler panicked");
                ExtensionError::failed(format!("Handler for '{command}' panicked")).into()
            }
            Err(_elapsed) => {
                error!(command = %command, "handler timed out after {:?}, left running", self.timeout);
                ExtensionError::failed(format!("Handler for '{command}' timed out")).into()
            }
        };
        let elapsed = start.elapsed();
        if elapsed >= SLOW_HANDLER {
            warn!(command = %command, duration_secs = elapsed.as_secs_f64(), "slow command");
        }
        reply
    }
}
