//! Shared broker state handed to every command handler.

use std::sync::Arc;

use exthost_settings::ExtHostSettings;

use crate::bus::SubscriptionBus;
use crate::headers::ExtraHeaders;
use crate::host::HostServices;
use crate::links::LinkHandlers;
use crate::objects::ClientObjectTable;
use crate::origins::OriginRegistry;
use crate::permission::{EnabledFlag, PermissionGate};
use crate::requests::RequestTracker;
use crate::traces::TraceSessions;

/// Every table the broker owns plus the host collaborators.
///
/// Handlers see this through [`crate::dispatcher::CallContext`]. The command
/// registry itself is deliberately not reachable from here.
pub struct BrokerContext {
    /// Effective settings.
    pub settings: ExtHostSettings,
    /// Global kill switch.
    pub enabled: EnabledFlag,
    /// Registered extension origins.
    pub origins: Arc<OriginRegistry>,
    /// Extension-created proxies.
    pub objects: Arc<ClientObjectTable>,
    /// Notification topics.
    pub bus: Arc<SubscriptionBus>,
    /// URL access policy.
    pub gate: PermissionGate,
    /// Extra request headers.
    pub headers: ExtraHeaders,
    /// Network request ids.
    pub requests: RequestTracker,
    /// Pending trace recordings.
    pub traces: TraceSessions,
    /// Open-resource link handlers.
    pub links: LinkHandlers,
    /// Host collaborators.
    pub host: HostServices,
}

impl BrokerContext {
    /// Fresh, enabled state over `host`.
    pub fn new(settings: ExtHostSettings, host: HostServices) -> Self {
        let enabled = EnabledFlag::new();
        Self {
            gate: PermissionGate::from_settings(&settings.permissions),
            bus: Arc::new(SubscriptionBus::new(enabled.clone())),
            enabled,
            origins: Arc::new(OriginRegistry::new()),
            objects: Arc::new(ClientObjectTable::new()),
            headers: ExtraHeaders::new(),
            requests: RequestTracker::new(),
            traces: TraceSessions::new(),
            links: LinkHandlers::new(),
            settings,
            host,
        }
    }

    /// Whether extensions may act on `url`.
    pub fn can_act_on_url(&self, url: &str) -> bool {
        self.gate.can_act_on_url(url)
    }
}
