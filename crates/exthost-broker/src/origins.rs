//! Extension origins and their registry.
//!
//! An origin is `scheme://host[:port]`. Registration is keyed by origin and
//! happens once per origin, no matter how many descriptors or frames share
//! it. Entries are never removed.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// `scheme://host[:port]` of a URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    /// Origin of a parsed URL.
    ///
    /// `url::Url::origin` treats non-special schemes (`chrome:`, `devtools:`)
    /// as opaque, so the tuple is assembled from the parts instead. URLs
    /// without a host have no origin.
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str().filter(|h| !h.is_empty())?;
        let origin = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };
        Some(Self(origin))
    }

    /// Origin of a URL string, `None` if it does not parse or has no host.
    pub fn parse(raw: &str) -> Option<Self> {
        Url::parse(raw.trim()).ok().as_ref().and_then(Self::from_url)
    }

    /// The origin text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registered extension metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// Display name.
    pub name: String,
    /// Start page the extension was loaded from.
    pub start_page: String,
}

/// Origins allowed to talk to the broker.
#[derive(Default)]
pub struct OriginRegistry {
    entries: RwLock<HashMap<Origin, Registration>>,
}

impl OriginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `origin`. Returns `false` (and changes nothing) when it is
    /// already known.
    pub fn register(&self, origin: Origin, registration: Registration) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&origin) {
            debug!(%origin, "origin already registered");
            return false;
        }
        info!(%origin, name = %registration.name, "registered extension origin");
        let _ = entries.insert(origin, registration);
        true
    }

    /// Whether `origin` may bind channels.
    pub fn is_registered(&self, origin: &Origin) -> bool {
        self.entries.read().contains_key(origin)
    }

    /// Display name of `origin`.
    pub fn name_of(&self, origin: &Origin) -> Option<String> {
        self.entries.read().get(origin).map(|r| r.name.clone())
    }

    /// Full registration of `origin`.
    pub fn get(&self, origin: &Origin) -> Option<Registration> {
        self.entries.read().get(origin).cloned()
    }

    /// Number of registered origins.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered origins, sorted.
    pub fn origins(&self) -> Vec<Origin> {
        let mut origins: Vec<Origin> = self.entries.read().keys().cloned().collect();
        origins.sort();
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(name: &str) -> Registration {
        Registration {
            name: name.into(),
            start_page: "https://ext.example/index.html".into(),
        }
    }

    #[test]
    fn origin_of_https_url_drops_path_and_default_port() {
        let o = Origin::parse("https://ext.example:443/devtools/page.html?x=1").unwrap();
        assert_eq!(o.as_str(), "https://ext.example");
    }

    #[test]
    fn origin_keeps_explicit_port() {
        let o = Origin::parse("http://localhost:8080/a").unwrap();
        assert_eq!(o.as_str(), "http://localhost:8080");
    }

    #[test]
    fn origin_of_non_special_scheme() {
        assert_eq!(
            Origin::parse("chrome://newtab/").unwrap().as_str(),
            "chrome://newtab"
        );
        assert_eq!(
            Origin::parse("chrome-extension://abcdef/panel.html")
                .unwrap()
                .as_str(),
            "chrome-extension://abcdef"
        );
    }

    #[test]
    fn origin_requires_host() {
        assert!(Origin::parse("data:text/plain,hi").is_none());
        assert!(Origin::parse("not a url").is_none());
        assert!(Origin::parse("").is_none());
    }

    #[test]
    fn register_is_idempotent() {
        let registry = OriginRegistry::new();
        let origin = Origin::parse("https://ext.example").unwrap();
        assert!(registry.register(origin.clone(), reg("First")));
        assert!(!registry.register(origin.clone(), reg("Second")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.name_of(&origin).as_deref(), Some("First"));
    }

    #[test]
    fn unknown_origin_is_not_registered() {
        let registry = OriginRegistry::new();
        let origin = Origin::parse("https://evil.example").unwrap();
        assert!(!registry.is_registered(&origin));
        assert!(registry.name_of(&origin).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn origins_sorted() {
        let registry = OriginRegistry::new();
        for raw in ["https://b.example", "https://a.example"] {
            let _ = registry.register(Origin::parse(raw).unwrap(), reg(raw));
        }
        let listed: Vec<String> = registry.origins().iter().map(ToString::to_string).collect();
        assert_eq!(listed, vec!["https://a.example", "https://b.example"]);
    }
}
