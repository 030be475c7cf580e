//! Trace recordings waiting for an extension to deliver their data.

use std::collections::HashMap;
use std::sync::Arc;

use exthost_core::TraceSessionId;
use parking_lot::Mutex;

use crate::host::TraceSession;

/// Session id → pending recording.
#[derive(Default)]
pub struct TraceSessions {
    sessions: Mutex<HashMap<TraceSessionId, Arc<dyn TraceSession>>>,
}

impl TraceSessions {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `session` under a fresh id.
    pub fn start(&self, session: Arc<dyn TraceSession>) -> TraceSessionId {
        let id = TraceSessionId::new();
        let _ = self.sessions.lock().insert(id.clone(), session);
        id
    }

    /// Remove and return the session under `id`.
    pub fn take(&self, id: &str) -> Option<Arc<dyn TraceSession>> {
        self.sessions.lock().remove(&TraceSessionId::from(id))
    }

    /// Number of pending sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl TraceSession for Noop {
        fn complete(&self, _url: Option<String>, _time_offset: f64) {}
    }

    #[test]
    fn take_removes_once() {
        let sessions = TraceSessions::new();
        let id = sessions.start(Arc::new(Noop));
        assert!(id.as_str().starts_with("trace_"));
        assert!(sessions.take(id.as_str()).is_some());
        assert!(sessions.take(id.as_str()).is_none());
        assert!(sessions.is_empty());
    }
}
