//! # exthost-core
//!
//! Foundation types shared by every extension host crate:
//!
//! - **Status vocabulary**: [`status::ExtensionError`] (typed failure kinds) and
//!   [`status::Status`] (the `{code, description, details}` wire record)
//! - **Branded IDs**: [`ids::ChannelId`], [`ids::TraceSessionId`]
//! - **Wire envelopes**: inbound commands, callbacks, and notifications
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod status;
pub mod wire;

pub use ids::{ChannelId, TraceSessionId};
pub use status::{ExtensionError, Status, StatusCode};
pub use wire::{CallbackEnvelope, InboundMessage, NotificationEnvelope};
