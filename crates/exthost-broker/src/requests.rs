//! Numeric ids for network requests handed to extensions.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::host::NetworkRequest;

#[derive(Default)]
struct Table {
    last: u64,
    by_host_id: HashMap<String, u64>,
    by_id: HashMap<u64, NetworkRequest>,
}

/// Maps host requests to broker-assigned ids.
///
/// Ids increase monotonically for the lifetime of the broker, including
/// across [`RequestTracker::clear`].
#[derive(Default)]
pub struct RequestTracker {
    inner: Mutex<Table>,
}

impl RequestTracker {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `request`, assigning one on first sight.
    pub fn id_for(&self, request: &NetworkRequest) -> u64 {
        let mut table = self.inner.lock();
        if let Some(id) = table.by_host_id.get(&request.id) {
            return *id;
        }
        table.last += 1;
        let id = table.last;
        let _ = table.by_host_id.insert(request.id.clone(), id);
        let _ = table.by_id.insert(id, request.clone());
        id
    }

    /// Request for an id sent by an extension: a number or numeric string.
    pub fn get(&self, id: &Value) -> Option<NetworkRequest> {
        let id = match id {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        self.inner.lock().by_id.get(&id).cloned()
    }

    /// Forget every request.
    pub fn clear(&self) {
        let mut table = self.inner.lock();
        table.by_host_id.clear();
        table.by_id.clear();
    }

    /// Number of tracked requests.
    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req(id: &str) -> NetworkRequest {
        NetworkRequest {
            id: id.into(),
            url: format!("https://x.example/{id}"),
            method: "GET".into(),
            status: Some(200),
            mime_type: None,
        }
    }

    #[test]
    fn ids_are_stable_and_monotonic() {
        let tracker = RequestTracker::new();
        assert_eq!(tracker.id_for(&req("a")), 1);
        assert_eq!(tracker.id_for(&req("b")), 2);
        assert_eq!(tracker.id_for(&req("a")), 1);
        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.id_for(&req("a")), 3);
    }

    #[test]
    fn lookup_accepts_numeric_strings() {
        let tracker = RequestTracker::new();
        let id = tracker.id_for(&req("a"));
        assert_eq!(tracker.get(&json!(id)).unwrap().id, "a");
        assert_eq!(tracker.get(&json!(id.to_string())).unwrap().id, "a");
        assert!(tracker.get(&json!("nope")).is_none());
        assert!(tracker.get(&json!(99)).is_none());
        assert!(tracker.get(&json!(null)).is_none());
    }
}
