//! Extension status vocabulary.
//!
//! Every broker operation answers with a [`Status`]: `OK` or one of seven
//! error codes. Handlers produce failures as a typed [`ExtensionError`]
//! carrying the offending id, argument, or reason; the wire record is only
//! built (and logged) when the error is converted into a [`Status`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Machine-readable status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// Success.
    #[serde(rename = "OK")]
    Ok,
    /// An object with the requested id already exists.
    #[serde(rename = "E_EXISTS")]
    Exists,
    /// An argument has an invalid value.
    #[serde(rename = "E_BADARG")]
    BadArg,
    /// An argument has the wrong type.
    #[serde(rename = "E_BADARGTYPE")]
    BadArgType,
    /// The referenced object, resource, frame, or context does not exist.
    #[serde(rename = "E_NOTFOUND")]
    NotFound,
    /// The operation is not supported (unknown command, wrong resource kind).
    #[serde(rename = "E_NOTSUPPORTED")]
    NotSupported,
    /// The inspector protocol itself failed.
    #[serde(rename = "E_PROTOCOLERROR")]
    ProtocolError,
    /// The operation failed (including permission denials).
    #[serde(rename = "E_FAILED")]
    Failed,
}

impl StatusCode {
    /// Wire name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Exists => "E_EXISTS",
            Self::BadArg => "E_BADARG",
            Self::BadArgType => "E_BADARGTYPE",
            Self::NotFound => "E_NOTFOUND",
            Self::NotSupported => "E_NOTSUPPORTED",
            Self::ProtocolError => "E_PROTOCOLERROR",
            Self::Failed => "E_FAILED",
        }
    }

    /// `printf`-style description template sent as `description`.
    ///
    /// The template arguments travel separately in `details`.
    pub fn description_template(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Exists => "Object already exists: %s",
            Self::BadArg => "Invalid argument %s: %s",
            Self::BadArgType => "Invalid type for argument %s: got %s, expected %s",
            Self::NotFound => "Object not found: %s",
            Self::NotSupported => "Object does not support requested operation: %s",
            Self::ProtocolError => "Inspector protocol error: %s",
            Self::Failed => "Operation failed: %s",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed errors
// ─────────────────────────────────────────────────────────────────────────────

/// A failed broker operation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    /// Id collision on creation.
    #[error("Object already exists: {id}")]
    Exists {
        /// The colliding id.
        id: String,
    },

    /// Argument value rejected.
    #[error("Invalid argument {name}: {reason}")]
    BadArg {
        /// Argument name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Argument of the wrong JSON type.
    #[error("Invalid type for argument {name}: got {actual}, expected {expected}")]
    BadArgType {
        /// Argument name.
        name: String,
        /// Type that was received.
        actual: String,
        /// Type that was expected.
        expected: String,
    },

    /// Referenced object does not exist.
    #[error("Object not found: {what}")]
    NotFound {
        /// Id, URL, or origin that could not be resolved.
        what: String,
    },

    /// Operation not supported for this command or object.
    #[error("Object does not support requested operation: {what}")]
    NotSupported {
        /// Command name or explanation.
        what: String,
    },

    /// Inspector protocol failure.
    #[error("Inspector protocol error: {message}")]
    ProtocolError {
        /// Transport error text.
        message: String,
    },

    /// Generic failure.
    #[error("Operation failed: {reason}")]
    Failed {
        /// Failure reason.
        reason: String,
    },
}

impl ExtensionError {
    /// `E_EXISTS(id)`.
    #[must_use]
    pub fn exists(id: impl Into<String>) -> Self {
        Self::Exists { id: id.into() }
    }

    /// `E_BADARG(name, reason)`.
    #[must_use]
    pub fn bad_arg(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadArg {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// `E_BADARGTYPE(name, actual, expected)`.
    #[must_use]
    pub fn bad_arg_type(
        name: impl Into<String>,
        actual: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::BadArgType {
            name: name.into(),
            actual: actual.into(),
            expected: expected.into(),
        }
    }

    /// `E_NOTFOUND(what)`.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// `E_NOTSUPPORTED(what)`.
    #[must_use]
    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::NotSupported { what: what.into() }
    }

    /// `E_PROTOCOLERROR(message)`.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    /// `E_FAILED(reason)`.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// `E_FAILED("Permission denied")`.
    #[must_use]
    pub fn permission_denied() -> Self {
        Self::failed("Permission denied")
    }

    /// Status code for this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::Exists { .. } => StatusCode::Exists,
            Self::BadArg { .. } => StatusCode::BadArg,
            Self::BadArgType { .. } => StatusCode::BadArgType,
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::NotSupported { .. } => StatusCode::NotSupported,
            Self::ProtocolError { .. } => StatusCode::ProtocolError,
            Self::Failed { .. } => StatusCode::Failed,
        }
    }

    /// Template arguments, in template order.
    pub fn details(&self) -> Vec<Value> {
        match self {
            Self::Exists { id } => vec![Value::from(id.as_str())],
            Self::BadArg { name, reason } => {
                vec![Value::from(name.as_str()), Value::from(reason.as_str())]
            }
            Self::BadArgType {
                name,
                actual,
                expected,
            } => vec![
                Value::from(name.as_str()),
                Value::from(actual.as_str()),
                Value::from(expected.as_str()),
            ],
            Self::NotFound { what } | Self::NotSupported { what } => {
                vec![Value::from(what.as_str())]
            }
            Self::ProtocolError { message } => vec![Value::from(message.as_str())],
            Self::Failed { reason } => vec![Value::from(reason.as_str())],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire record
// ─────────────────────────────────────────────────────────────────────────────

/// Status record sent to extensions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Status code.
    pub code: StatusCode,
    /// Description template.
    pub description: String,
    /// Template arguments.
    pub details: Vec<Value>,
    /// Set on every non-`OK` status.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Status {
    /// The `OK` status.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            description: StatusCode::Ok.description_template().to_owned(),
            details: Vec::new(),
            is_error: false,
        }
    }

    /// Whether this is `OK`.
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    /// Serialize into a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<ExtensionError> for Status {
    fn from(err: ExtensionError) -> Self {
        let code = err.code();
        tracing::error!(code = %code, "Extension server error: {err}");
        Self {
            code,
            description: code.description_template().to_owned(),
            details: err.details(),
            is_error: true,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.description)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
