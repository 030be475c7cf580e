//! Broker and permission settings.

use serde::{Deserialize, Serialize};

/// Dispatcher and extension-loading settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrokerSettings {
    /// Upper bound on a single handler invocation, in milliseconds.
    pub handler_timeout_ms: u64,
    /// Whether `applyStyleSheet` is honoured.
    pub apply_custom_stylesheet: bool,
    /// Extensions added at startup.
    pub extensions: Vec<ExtensionDescriptor>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 30_000,
            apply_custom_stylesheet: false,
            extensions: Vec::new(),
        }
    }
}

/// An extension the host asks the broker to load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionDescriptor {
    /// Absolute URL of the extension's start page. Its origin becomes the
    /// extension's identity.
    pub start_page: String,
    /// Display name. Defaults to `Extension <origin>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether experimental APIs are exposed to the extension page.
    #[serde(default, rename = "exposeExperimentalAPIs")]
    pub expose_experimental_apis: bool,
}

impl ExtensionDescriptor {
    /// Descriptor with only a start page.
    pub fn new(start_page: impl Into<String>) -> Self {
        Self {
            start_page: start_page.into(),
            name: None,
            expose_experimental_apis: false,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Which inspected pages extensions may observe or act on.
///
/// The policy is default-allow: only the listed schemes and the storefront
/// are denied, and the allowed origins override the scheme deny-list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionSettings {
    /// Origins always allowed, even under a denied scheme.
    pub allowed_origins: Vec<String>,
    /// Schemes (without `:`) that are never inspectable.
    pub denied_schemes: Vec<String>,
    /// Host of the extension storefront.
    pub storefront_host: String,
    /// Path prefix of the storefront on that host.
    pub storefront_path_prefix: String,
}

impl Default for PermissionSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "chrome://newtab".to_string(),
                "chrome://new-tab-page".to_string(),
            ],
            denied_schemes: vec!["chrome".to_string(), "devtools".to_string()],
            storefront_host: "chrome.google.com".to_string(),
            storefront_path_prefix: "/webstore".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_wire_names() {
        let d: ExtensionDescriptor = serde_json::from_str(
            r#"{"startPage":"https://ext.example/p.html","name":"Ext","exposeExperimentalAPIs":true}"#,
        )
        .unwrap();
        assert_eq!(d.start_page, "https://ext.example/p.html");
        assert_eq!(d.name.as_deref(), Some("Ext"));
        assert!(d.expose_experimental_apis);
    }

    #[test]
    fn descriptor_optional_fields() {
        let d: ExtensionDescriptor =
            serde_json::from_str(r#"{"startPage":"https://ext.example/"}"#).unwrap();
        assert_eq!(d, ExtensionDescriptor::new("https://ext.example/"));
    }

    #[test]
    fn default_permissions() {
        let p = PermissionSettings::default();
        assert!(p.allowed_origins.contains(&"chrome://newtab".to_string()));
        assert_eq!(p.denied_schemes, vec!["chrome", "devtools"]);
    }
}
