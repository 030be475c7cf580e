//! Open-resource link handlers.
//!
//! An extension may ask to receive link activations for resources the user
//! opens in the host. Handlers are keyed by the extension's display name,
//! one channel per name.

use std::collections::HashMap;
use std::sync::Arc;

use exthost_core::ChannelId;
use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use crate::channel::ExtensionChannel;
use crate::host::ResourceRef;

/// `kind` of a link activation frame.
pub const OPEN_RESOURCE_KIND: &str = "open-resource";

/// Handler name → channel.
#[derive(Default)]
pub struct LinkHandlers {
    handlers: Mutex<HashMap<String, Arc<ExtensionChannel>>>,
}

impl LinkHandlers {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route activations for `name` to `channel`, replacing any earlier one.
    pub fn set(&self, name: &str, channel: &Arc<ExtensionChannel>) {
        let _ = self
            .handlers
            .lock()
            .insert(name.to_owned(), Arc::clone(channel));
    }

    /// Stop routing `name`. Returns whether a handler was removed.
    pub fn remove(&self, name: &str) -> bool {
        self.handlers.lock().remove(name).is_some()
    }

    /// Drop every handler bound to `channel_id`; returns their names.
    pub fn remove_channel(&self, channel_id: &ChannelId) -> Vec<String> {
        let mut handlers = self.handlers.lock();
        let mut names: Vec<String> = handlers
            .iter()
            .filter(|(_, ch)| ch.id() == channel_id)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &names {
            let _ = handlers.remove(name);
        }
        names.sort();
        names
    }

    /// Whether `name` has a handler.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.lock().contains_key(name)
    }

    /// Send an activation to the handler for `name`.
    ///
    /// `line` is zero-based; the frame carries it one-based. Returns `false`
    /// when nobody handles `name`.
    pub fn open(&self, name: &str, resource: &ResourceRef, line: u32) -> bool {
        let Some(channel) = self.handlers.lock().get(name).cloned() else {
            return false;
        };
        debug!(handler = name, url = %resource.url, line, "forwarding link activation");
        channel.send_json(&json!({
            "kind": OPEN_RESOURCE_KIND,
            "resource": resource.to_json(),
            "lineNumber": line.saturating_add(1),
        }))
    }
}
