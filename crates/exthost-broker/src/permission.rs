//! Page access policy and the global kill switch.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use exthost_settings::PermissionSettings;
use tracing::warn;
use url::Url;

use crate::origins::Origin;

/// Sticky broker-wide enable flag.
///
/// Starts enabled. [`disable`](Self::disable) is one-way: there is no
/// re-enable. Clones share the same flag.
#[derive(Clone, Debug)]
pub struct EnabledFlag(Arc<AtomicBool>);

impl EnabledFlag {
    /// A new, enabled flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Whether dispatch and notifications are allowed.
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Disable for good. Returns `true` on the enabled → disabled transition.
    pub fn disable(&self) -> bool {
        let was_enabled = self.0.swap(false, Ordering::AcqRel);
        if was_enabled {
            warn!("extensions disabled for the rest of the session");
        }
        was_enabled
    }
}

impl Default for EnabledFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides whether extensions may observe or act on a URL.
///
/// Default-allow: a URL is refused only if it does not parse, uses a denied
/// scheme (unless its origin is explicitly allowed), or points into the
/// extension storefront.
#[derive(Clone, Debug)]
pub struct PermissionGate {
    allowed_origins: HashSet<Origin>,
    denied_schemes: HashSet<String>,
    storefront_host: String,
    storefront_path_prefix: String,
}

impl PermissionGate {
    /// Build from settings. Allowed origins that do not parse are skipped.
    pub fn from_settings(settings: &PermissionSettings) -> Self {
        let allowed_origins = settings
            .allowed_origins
            .iter()
            .filter_map(|raw| {
                let origin = Origin::parse(raw);
                if origin.is_none() {
                    warn!(origin = %raw, "ignoring unparseable allowed origin");
                }
                origin
            })
            .collect();
        Self {
            allowed_origins,
            denied_schemes: settings
                .denied_schemes
                .iter()
                .map(|s| s.trim_end_matches(':').to_ascii_lowercase())
                .collect(),
            storefront_host: settings.storefront_host.to_ascii_lowercase(),
            storefront_path_prefix: settings.storefront_path_prefix.clone(),
        }
    }

    /// Whether extensions may act on `url`.
    pub fn can_act_on_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if Origin::from_url(&parsed).is_some_and(|o| self.allowed_origins.contains(&o)) {
            return true;
        }
        if self.denied_schemes.contains(parsed.scheme()) {
            return false;
        }
        let is_storefront = parsed.scheme().starts_with("http")
            && parsed.host_str() == Some(self.storefront_host.as_str())
            && parsed.path().starts_with(&self.storefront_path_prefix);
        !is_storefront
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::from_settings(&PermissionSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_settings_denied() {
        assert!(!PermissionGate::default().can_act_on_url("chrome://settings"));
    }

    #[test]
    fn newtab_allowed() {
        let gate = PermissionGate::default();
        assert!(gate.can_act_on_url("chrome://newtab"));
        assert!(gate.can_act_on_url("chrome://newtab/"));
        assert!(gate.can_act_on_url("chrome://new-tab-page/"));
    }

    #[test]
    fn webstore_denied() {
        let gate = PermissionGate::default();
        assert!(!gate.can_act_on_url("https://chrome.google.com/webstore/foo"));
        assert!(!gate.can_act_on_url("http://chrome.google.com/webstore"));
    }

    #[test]
    fn other_google_paths_allowed() {
        assert!(PermissionGate::default().can_act_on_url("https://chrome.google.com/other"));
    }

    #[test]
    fn ordinary_sites_allowed() {
        let gate = PermissionGate::default();
        assert!(gate.can_act_on_url("https://example.com"));
        assert!(gate.can_act_on_url("file:///tmp/index.html"));
        assert!(gate.can_act_on_url("about:blank"));
    }

    #[test]
    fn devtools_scheme_denied() {
        assert!(!PermissionGate::default().can_act_on_url("devtools://devtools/bundled/inspector.html"));
    }

    #[test]
    fn garbage_denied() {
        let gate = PermissionGate::default();
        assert!(!gate.can_act_on_url("not a url"));
        assert!(!gate.can_act_on_url(""));
    }

    #[test]
    fn custom_settings() {
        let gate = PermissionGate::from_settings(&PermissionSettings {
            allowed_origins: vec!["edge://newtab".into(), "::bad::".into()],
            denied_schemes: vec!["edge:".into()],
            storefront_host: "store.example".into(),
            storefront_path_prefix: "/addons".into(),
        });
        assert!(gate.can_act_on_url("edge://newtab/"));
        assert!(!gate.can_act_on_url("edge://settings"));
        assert!(gate.can_act_on_url("chrome://settings"));
        assert!(!gate.can_act_on_url("https://store.example/addons/x"));
        assert!(gate.can_act_on_url("https://chrome.google.com/webstore"));
    }

    #[test]
    fn flag_is_sticky() {
        let flag = EnabledFlag::new();
        let shared = flag.clone();
        assert!(flag.is_enabled());
        assert!(shared.disable());
        assert!(!shared.disable());
        assert!(!flag.is_enabled());
    }
}
