//! Per-extension message channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use exthost_core::ChannelId;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::origins::Origin;

/// One bidirectional link to an extension.
///
/// Outbound frames are queued on a bounded `mpsc` sender drained by the
/// transport's writer task. The origin is attached once, by the handshake,
/// and never changes afterwards.
pub struct ExtensionChannel {
    id: ChannelId,
    origin: OnceLock<Origin>,
    tx: mpsc::Sender<Arc<String>>,
    opened_at: Instant,
    dropped: AtomicU64,
}

impl ExtensionChannel {
    /// Wrap an outbound sender.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: ChannelId::new(),
            origin: OnceLock::new(),
            tx,
            opened_at: Instant::now(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Channel plus the receiving end of its outbound queue.
    pub fn pair(buffer: usize) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Arc::new(Self::new(tx)), rx)
    }

    /// Channel identity.
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Origin bound by the handshake, if any.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.get()
    }

    /// Whether the handshake has bound this channel.
    pub fn is_bound(&self) -> bool {
        self.origin.get().is_some()
    }

    /// Attach `origin`. Returns `false` if the channel was already bound.
    pub(crate) fn bind(&self, origin: Origin) -> bool {
        self.origin.set(origin).is_ok()
    }

    /// Queue a raw text frame.
    ///
    /// A full or closed queue drops the frame and bumps the drop counter.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            return true;
        }
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(channel = %self.id, dropped, "outbound queue full or closed, dropping frame");
        false
    }

    /// Serialize `value` and queue it.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(channel = %self.id, error = %e, "failed to serialize outbound frame");
                false
            }
        }
    }

    /// Frames dropped so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the transport side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Time since the channel was opened.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl std::fmt::Debug for ExtensionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionChannel")
            .field("id", &self.id)
            .field("origin", &self.origin.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn send_json_reaches_receiver() {
        let (chan, mut rx) = ExtensionChannel::pair(4);
        assert!(chan.send_json(&json!({"kind": "callback"})));
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.as_str(), r#"{"kind":"callback"}"#);
    }

    #[test]
    fn full_queue_counts_drops() {
        let (chan, _rx) = ExtensionChannel::pair(1);
        assert!(chan.send(Arc::new("a".into())));
        assert!(!chan.send(Arc::new("b".into())));
        assert!(!chan.send(Arc::new("c".into())));
        assert_eq!(chan.drop_count(), 2);
    }

    #[test]
    fn closed_queue_counts_drops() {
        let (chan, rx) = ExtensionChannel::pair(4);
        drop(rx);
        assert!(chan.is_closed());
        assert!(!chan.send(Arc::new("x".into())));
        assert_eq!(chan.drop_count(), 1);
    }

    #[test]
    fn bind_is_once() {
        let (chan, _rx) = ExtensionChannel::pair(1);
        assert!(!chan.is_bound());
        assert!(chan.bind(Origin::parse("https://a.example").unwrap()));
        assert!(!chan.bind(Origin::parse("https://b.example").unwrap()));
        assert_eq!(chan.origin().unwrap().as_str(), "https://a.example");
    }

    #[test]
    fn ids_are_distinct() {
        let (a, _ra) = ExtensionChannel::pair(1);
        let (b, _rb) = ExtensionChannel::pair(1);
        assert_ne!(a.id(), b.id());
    }
}
