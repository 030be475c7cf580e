//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a settings file
//! may be partial: missing fields keep their compiled default.

mod broker;
mod server;

pub use broker::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the extension host.
///
/// ```json
/// {
///   "server": { "port": 9230 },
///   "broker": { "extensions": [{ "startPage": "https://ext.example/devtools.html" }] },
///   "permissions": { "deniedSchemes": ["chrome", "devtools", "edge"] }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtHostSettings {
    /// Network listener.
    pub server: ServerSettings,
    /// Dispatcher and extension loading.
    pub broker: BrokerSettings,
    /// Page access policy.
    pub permissions: PermissionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ExtHostSettings {
    /// Reject values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if self.server.channel_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.channelBuffer must be at least 1".into(),
            ));
        }
        if self.broker.handler_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "broker.handlerTimeoutMs must be at least 1".into(),
            ));
        }
        if let Some(ext) = self
            .broker
            .extensions
            .iter()
            .find(|ext| ext.start_page.trim().is_empty())
        {
            return Err(SettingsError::InvalidValue(format!(
                "broker.extensions: empty startPage (name: {:?})",
                ext.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_validate() {
        assert!(ExtHostSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_buffer_rejected() {
        let mut s = ExtHostSettings::default();
        s.server.channel_buffer = 0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn empty_start_page_rejected() {
        let mut s = ExtHostSettings::default();
        s.broker.extensions.push(ExtensionDescriptor {
            start_page: "  ".into(),
            name: Some("Broken".into()),
            expose_experimental_apis: false,
        });
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: ExtHostSettings =
            serde_json::from_str(r#"{"logging": {"json": true}}"#).unwrap();
        assert!(s.logging.json);
        assert_eq!(s.logging.level, LoggingSettings::default().level);
        assert_eq!(s.server, ServerSettings::default());
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(ExtHostSettings::default()).unwrap();
        assert!(v["server"].get("channelBuffer").is_some());
        assert!(v["broker"].get("handlerTimeoutMs").is_some());
        assert!(v["permissions"].get("storefrontPathPrefix").is_some());
    }
}
