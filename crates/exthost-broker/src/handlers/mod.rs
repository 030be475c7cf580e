//! Command handler modules and registration.

pub mod inspected;
pub mod network;
pub mod panels;
pub mod sidebar;
pub mod subscriptions;
pub mod trace;
pub mod ui;

use crate::dispatcher::CommandRegistry;

/// Register every extension command with the registry.
pub fn register_all(registry: &mut CommandRegistry) {
    // Panels and toolbar buttons
    registry.register("createPanel", panels::CreatePanelHandler);
    registry.register("showPanel", panels::ShowPanelHandler);
    registry.register("createToolbarButton", panels::CreateToolbarButtonHandler);
    registry.register("updateButton", panels::UpdateButtonHandler);

    // Sidebar panes
    registry.register("createSidebarPane", sidebar::CreateSidebarPaneHandler);
    registry.register("setSidebarHeight", sidebar::SetSidebarHeightHandler);
    registry.register("setSidebarContent", sidebar::SetSidebarContentHandler);
    registry.register("setSidebarPage", sidebar::SetSidebarPageHandler);

    // Inspected page
    registry.register("evaluateOnInspectedPage", inspected::EvaluateOnInspectedPageHandler);
    registry.register("Reload", inspected::ReloadHandler);
    registry.register("getPageResources", inspected::GetPageResourcesHandler);
    registry.register("getResourceContent", inspected::GetResourceContentHandler);
    registry.register("setResourceContent", inspected::SetResourceContentHandler);
    registry.register("openResource", inspected::OpenResourceHandler);

    // Network
    registry.register("addRequestHeaders", network::AddRequestHeadersHandler);
    registry.register("getHAR", network::GetHarHandler);
    registry.register("getRequestContent", network::GetRequestContentHandler);

    // Notifications
    registry.register("subscribe", subscriptions::SubscribeHandler);
    registry.register("unsubscribe", subscriptions::UnsubscribeHandler);

    // Tracing
    registry.register("addTraceProvider", trace::AddTraceProviderHandler);
    registry.register("completeTraceSession", trace::CompleteTraceSessionHandler);

    // Host UI
    registry.register("applyStyleSheet", ui::ApplyStyleSheetHandler);
    registry.register("_forwardKeyboardEvent", ui::ForwardKeyboardEventHandler);
    registry.register("setOpenResourceHandler", ui::SetOpenResourceHandlerHandler);
    registry.register(
        "registerLanguageExtensionPlugin",
        ui::RegisterLanguageExtensionPluginHandler,
    );
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Arc;

    use exthost_settings::ExtHostSettings;
    use serde::de::DeserializeOwned;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use crate::channel::ExtensionChannel;
    use crate::context::BrokerContext;
    use crate::dispatcher::CallContext;
    use crate::host::HostServices;
    use crate::memory::MemoryHost;
    use crate::origins::{Origin, Registration};

    /// Origin every handler test calls from.
    pub const EXT_ORIGIN: &str = "chrome-extension://test-ext";

    /// Host services backed by one in-memory host.
    pub fn host_services(host: &Arc<MemoryHost>) -> HostServices {
        host.services()
    }

    /// Context over a host inspecting an ordinary page.
    pub fn make_test_context() -> (Arc<BrokerContext>, Arc<MemoryHost>) {
        make_test_context_with(MemoryHost::with_page("https://inspected.example/"))
    }

    /// Context over `host` with default settings.
    pub fn make_test_context_with(host: MemoryHost) -> (Arc<BrokerContext>, Arc<MemoryHost>) {
        make_test_context_from(host, ExtHostSettings::default())
    }

    /// Context over `host` with `settings`.
    pub fn make_test_context_from(
        host: MemoryHost,
        settings: ExtHostSettings,
    ) -> (Arc<BrokerContext>, Arc<MemoryHost>) {
        let host = Arc::new(host);
        let ctx = Arc::new(BrokerContext::new(settings, host_services(&host)));
        (ctx, host)
    }

    /// Register `origin` and return a channel bound to it.
    pub fn bound_channel(
        ctx: &BrokerContext,
        origin: &str,
    ) -> (Arc<ExtensionChannel>, mpsc::Receiver<Arc<String>>) {
        let origin = Origin::parse(origin).expect("valid test origin");
        let _ = ctx.origins.register(
            origin.clone(),
            Registration {
                name: format!("Extension {origin}"),
                start_page: format!("{origin}/devtools.html"),
            },
        );
        let (channel, rx) = ExtensionChannel::pair(64);
        assert!(channel.bind(origin));
        (channel, rx)
    }

    /// Call context for a handler invoked directly.
    pub fn call_context(
        ctx: &Arc<BrokerContext>,
        command: &str,
    ) -> (CallContext, mpsc::Receiver<Arc<String>>) {
        let (channel, rx) = bound_channel(ctx, EXT_ORIGIN);
        let origin = channel.origin().cloned().expect("bound");
        let call = CallContext {
            channel,
            origin,
            command: command.to_owned(),
            broker: Arc::clone(ctx),
        };
        (call, rx)
    }

    /// Decode handler params from JSON.
    pub fn params<T: DeserializeOwned>(value: Value) -> T {
        serde_json::from_value(value).expect("valid params")
    }

    /// Every frame queued so far, decoded.
    pub fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::from_str(&frame).expect("json frame"));
        }
        frames
    }
}
