//! Extra request headers contributed by extensions.
//!
//! Each extension id accumulates one header map; a later call overrides
//! earlier values name by name. The effective header set merges all maps in
//! the order the extensions first contributed, so a later extension wins on
//! a shared name. `__proto__` and non-string values are dropped at merge.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

/// Per-extension header maps.
#[derive(Default)]
pub struct ExtraHeaders {
    by_extension: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl ExtraHeaders {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `headers` into the map of `extension_id` and return the
    /// effective header set.
    pub fn add(&self, extension_id: &str, headers: &Map<String, Value>) -> BTreeMap<String, String> {
        let mut table = self.by_extension.lock();
        let index = match table.iter().position(|(id, _)| id == extension_id) {
            Some(i) => i,
            None => {
                table.push((extension_id.to_owned(), Map::new()));
                table.len() - 1
            }
        };
        let own = &mut table[index].1;
        for (name, value) in headers {
            let _ = own.insert(name.clone(), value.clone());
        }
        debug!(extension_id, count = own.len(), "extension headers updated");
        merge(&table)
    }

    /// Current effective header set.
    pub fn merged(&self) -> BTreeMap<String, String> {
        merge(&self.by_extension.lock())
    }
}

fn merge(table: &[(String, Map<String, Value>)]) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for (_, headers) in table {
        for (name, value) in headers {
            if name == "__proto__" {
                continue;
            }
            if let Some(value) = value.as_str() {
                let _ = merged.insert(name.clone(), value.to_owned());
            }
        }
    }
    merged
}
