//! The broker: one per inspected session, shared by every channel.
//!
//! [`Broker`] owns the command registry and the [`BrokerContext`] tables,
//! wires host event streams to notification topics, and exposes the
//! host-facing operations: adding extensions, binding channels, navigation
//! handling, and the notifications the host UI raises on its own.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use exthost_core::{InboundMessage, TraceSessionId};
use exthost_settings::{ExtHostSettings, ExtensionDescriptor};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::ExtensionChannel;
use crate::context::BrokerContext;
use crate::dispatcher::{CommandRegistry, Reply};
use crate::handlers;
use crate::host::{
    CommittedContent, HostServices, Navigation, NetworkRequest, ResourceRef, TraceSession,
};
use crate::origins::{Origin, Registration};
use crate::pump::EventPump;

/// Topic published when the main target navigates.
pub const INSPECTED_URL_CHANGED: &str = "inspected-url-changed";
/// Topic published when the workspace gains a resource.
pub const RESOURCE_ADDED: &str = "resource-added";
/// Topic published when a network request finishes.
pub const NETWORK_REQUEST_FINISHED: &str = "network-request-finished";
/// Topic published when the elements panel selection changes.
pub const ELEMENTS_SELECTION_CHANGED: &str = "panel-objectSelected-elements";
/// Topic published when the sources panel selection changes.
pub const SOURCES_SELECTION_CHANGED: &str = "panel-objectSelected-sources";
/// Topic published when the user commits a working copy.
pub const RESOURCE_CONTENT_COMMITTED: &str = "resource-content-committed";

/// Why an extension was not added.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddExtensionError {
    /// Extensions are disabled for this session.
    #[error("extensions are disabled")]
    Disabled,
    /// The start page has no origin.
    #[error("cannot add extension, malformed start page: {0}")]
    InvalidStartPage(String),
}

/// A selection range in the sources panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    /// First line, zero-based.
    pub start_line: u32,
    /// First column, zero-based.
    pub start_column: u32,
    /// Last line, zero-based.
    pub end_line: u32,
    /// Last column, zero-based.
    pub end_column: u32,
}

/// Counters for the health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    /// Registered extension origins.
    pub extensions: usize,
    /// Live client objects.
    pub objects: usize,
    /// Topics with at least one subscriber.
    pub topics: usize,
    /// Whether dispatch is enabled.
    pub enabled: bool,
}

/// Extension message broker.
pub struct Broker {
    context: Arc<BrokerContext>,
    registry: CommandRegistry,
    navigation_watch: Mutex<Option<JoinHandle<()>>>,
    started_at: Instant,
}

impl Broker {
    /// Create a broker over `host` with every command registered and every
    /// host event topic wired.
    pub fn new(settings: ExtHostSettings, host: HostServices) -> Arc<Self> {
        let timeout = Duration::from_millis(settings.broker.handler_timeout_ms);
        let mut registry = CommandRegistry::new(timeout);
        handlers::register_all(&mut registry);

        let context = Arc::new(BrokerContext::new(settings, host));
        install_pumps(&context);
        info!(commands = registry.commands().len(), "extension broker ready");

        Arc::new(Self {
            context,
            registry,
            navigation_watch: Mutex::new(None),
            started_at: Instant::now(),
        })
    }

    /// Shared state, as handlers see it.
    pub fn context(&self) -> &Arc<BrokerContext> {
        &self.context
    }

    /// The command registry.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Time since the broker was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Follow the inspected page's navigations until the broker is dropped.
    ///
    /// Must be called inside a tokio runtime. Calling it again restarts the
    /// watcher.
    pub fn watch_navigations(self: &Arc<Self>) {
        let mut navigations = self.context.host.page.navigations();
        let broker = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match navigations.recv().await {
                    Ok(navigation) => {
                        let Some(broker) = Weak::upgrade(&broker) else { break };
                        broker.inspected_url_changed(&navigation);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(lagged = n, "navigation watcher lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("navigation watcher finished");
        });
        if let Some(previous) = self.navigation_watch.lock().replace(handle) {
            previous.abort();
        }
    }

    // ── Extensions and channels ─────────────────────────────────────

    /// Register the extension behind `descriptor` and load its start page.
    ///
    /// Adding an extension while the inspected page is off limits disables
    /// the broker for good.
    pub fn add_extension(&self, descriptor: &ExtensionDescriptor) -> Result<Origin, AddExtensionError> {
        let inspected_url = self.context.host.page.inspected_url();
        if !inspected_url.is_empty() && !self.context.can_act_on_url(&inspected_url) {
            let _ = self.disable_all();
        }
        if !self.is_enabled() {
            return Err(AddExtensionError::Disabled);
        }

        let Some(origin) = Origin::parse(&descriptor.start_page) else {
            error!(start_page = %descriptor.start_page, "cannot add extension, malformed start page");
            return Err(AddExtensionError::InvalidStartPage(descriptor.start_page.clone()));
        };
        let name = descriptor
            .name
            .clone()
            .unwrap_or_else(|| format!("Extension {origin}"));
        let _ = self.context.origins.register(
            origin.clone(),
            Registration {
                name,
                start_page: descriptor.start_page.clone(),
            },
        );
        let name = self
            .context
            .origins
            .name_of(&origin)
            .unwrap_or_else(|| format!("Extension {origin}"));
        self.context
            .host
            .frontend
            .load_extension_frame(&descriptor.start_page, &name);
        Ok(origin)
    }

    /// Run the handshake for `channel`: bind it to the claimed origin if
    /// that origin is registered. Returns whether the channel is now bound.
    pub fn bind_channel(&self, origin_claim: &str, channel: &ExtensionChannel) -> bool {
        let origin = Origin::parse(origin_claim).filter(|o| self.context.origins.is_registered(o));
        let Some(origin) = origin else {
            error!(origin = %origin_claim, channel = %channel.id(), "ignoring unauthorized client request");
            return false;
        };
        if channel.bind(origin.clone()) {
            info!(origin = %origin, channel = %channel.id(), "extension channel bound");
            true
        } else {
            warn!(channel = %channel.id(), "channel already bound, ignoring handshake");
            false
        }
    }

    /// Handle one command from `channel`.
    pub async fn dispatch(&self, channel: &Arc<ExtensionChannel>, message: InboundMessage) -> Reply {
        self.registry.dispatch(&self.context, channel, message).await
    }

    /// Forget `channel`: drop its subscriptions and link handlers.
    pub fn channel_closed(&self, channel: &ExtensionChannel) {
        let topics = self.context.bus.remove_channel(channel.id());
        for name in self.context.links.remove_channel(channel.id()) {
            self.context.host.frontend.unregister_link_handler(&name);
        }
        debug!(
            channel = %channel.id(),
            topics = topics.len(),
            dropped = channel.drop_count(),
            "extension channel closed"
        );
    }

    /// Free a client object id when the host tears down its UI.
    pub fn dispose_object(&self, id: &str) -> bool {
        self.context.objects.dispose(id).is_some()
    }

    // ── Enable state ────────────────────────────────────────────────

    /// Disable every extension for the rest of the session.
    pub fn disable_all(&self) -> bool {
        self.context.enabled.disable()
    }

    /// Whether dispatch and notifications are allowed.
    pub fn is_enabled(&self) -> bool {
        self.context.enabled.is_enabled()
    }

    /// React to a navigation of any target.
    ///
    /// A disallowed URL disables the broker. Main-target navigations forget
    /// tracked requests and notify `inspected-url-changed`.
    pub fn inspected_url_changed(&self, navigation: &Navigation) {
        if !self.context.can_act_on_url(&navigation.url) {
            let _ = self.disable_all();
            return;
        }
        if !navigation.is_main_target {
            return;
        }
        self.context.requests.clear();
        let _ = self
            .context
            .bus
            .publish(INSPECTED_URL_CHANGED, vec![json!(navigation.url)]);
    }

    // ── Host-side notifications ─────────────────────────────────────

    /// Whether anybody listens on `topic`.
    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.context.bus.has_subscribers(topic)
    }

    /// The user searched in extension panel `panel_id`.
    pub fn notify_search_action(&self, panel_id: &str, action: &str, query: Option<&str>) {
        let _ = self.context.bus.publish(
            &format!("panel-search-{panel_id}"),
            vec![json!(action), json!(query)],
        );
    }

    /// Extension view `id` became visible.
    pub fn notify_view_shown(&self, id: &str, frame_index: Option<u32>) {
        let _ = self
            .context
            .bus
            .publish(&format!("view-shown-{id}"), vec![json!(frame_index)]);
    }

    /// Extension view `id` was hidden.
    pub fn notify_view_hidden(&self, id: &str) {
        let _ = self.context.bus.publish(&format!("view-hidden-{id}"), Vec::new());
    }

    /// Toolbar button `id` was clicked.
    pub fn notify_button_clicked(&self, id: &str) {
        let _ = self.context.bus.publish(&format!("button-clicked-{id}"), Vec::new());
    }

    /// The sources panel selection moved.
    pub fn source_selection_changed(&self, url: &str, range: TextRange) {
        let mut selection = serde_json::to_value(range).unwrap_or_else(|_| json!({}));
        if let Some(fields) = selection.as_object_mut() {
            let _ = fields.insert("url".to_owned(), json!(url));
        }
        let _ = self
            .context
            .bus
            .publish(SOURCES_SELECTION_CHANGED, vec![selection]);
    }

    /// The host started a recording with trace provider `provider_id`.
    pub fn start_trace_recording(&self, provider_id: &str, session: Arc<dyn TraceSession>) -> TraceSessionId {
        let session_id = self.context.traces.start(session);
        let _ = self.context.bus.publish(
            &format!("trace-recording-started-{provider_id}"),
            vec![json!(session_id.as_str())],
        );
        session_id
    }

    /// The host stopped recording with trace provider `provider_id`.
    pub fn stop_trace_recording(&self, provider_id: &str) {
        let _ = self
            .context
            .bus
            .publish(&format!("trace-recording-stopped-{provider_id}"), Vec::new());
    }

    /// Route a link activation to the extension registered as `handler`.
    pub fn handle_open_url(&self, handler: &str, resource: &ResourceRef, line: u32) -> bool {
        self.context.links.open(handler, resource, line)
    }

    /// Snapshot of broker counters.
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            extensions: self.context.origins.len(),
            objects: self.context.objects.len(),
            topics: self.context.bus.topics().len(),
            enabled: self.is_enabled(),
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if let Some(handle) = self.navigation_watch.get_mut().take() {
            handle.abort();
        }
    }
}

fn install_pumps(context: &Arc<BrokerContext>) {
    let host = &context.host;

    let workspace = Arc::clone(&host.workspace);
    EventPump::single(RESOURCE_ADDED, move || workspace.sources_added(), |resource: ResourceRef| {
        Some(vec![resource.to_json()])
    })
    .install(&context.bus);

    let network = Arc::clone(&host.network);
    let weak = Arc::downgrade(context);
    EventPump::aggregate(
        NETWORK_REQUEST_FINISHED,
        move || network.requests_finished(),
        move |request: NetworkRequest| {
            let context = weak.upgrade()?;
            let request_id = context.requests.id_for(&request);
            // The HAR entry is built asynchronously; publish once it is ready.
            let _ = tokio::spawn(async move {
                let entry = context.host.network.har_entry(&request).await;
                let _ = context
                    .bus
                    .publish(NETWORK_REQUEST_FINISHED, vec![json!(request_id), entry]);
            });
            None
        },
    )
    .install(&context.bus);

    let page = Arc::clone(&host.page);
    EventPump::single(ELEMENTS_SELECTION_CHANGED, move || page.element_selections(), |()| {
        Some(Vec::new())
    })
    .install(&context.bus);

    let workspace = Arc::clone(&host.workspace);
    let tracking_on = Arc::clone(&host.workspace);
    let tracking_off = Arc::clone(&host.workspace);
    EventPump::single(
        RESOURCE_CONTENT_COMMITTED,
        move || workspace.working_copies_committed(),
        |committed: CommittedContent| {
            Some(vec![committed.resource.to_json(), Value::String(committed.content)])
        },
    )
    .on_start(move || tracking_on.set_has_resource_content_tracking(true))
    .on_stop(move || tracking_off.set_has_resource_content_tracking(false))
    .install(&context.bus);
}
