//! Topic-based notification bus.
//!
//! A topic exists only while it has subscribers. The first subscriber runs
//! the topic's start hook (before being added) and the last unsubscriber
//! runs its stop hook (after being removed), so the event source feeding a
//! topic is attached only while somebody listens.
//!
//! Hooks run under the bus lock: they must not call back into the bus
//! synchronously. Spawning a task that publishes later is fine.

use std::collections::HashMap;
use std::sync::Arc;

use exthost_core::{ChannelId, NotificationEnvelope};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::ExtensionChannel;
use crate::permission::EnabledFlag;

/// A lifecycle hook.
pub type TopicHook = Arc<dyn Fn() + Send + Sync>;

/// Start/stop hooks of one topic.
#[derive(Clone)]
pub struct TopicHooks {
    /// Runs when the topic gains its first subscriber.
    pub on_first: TopicHook,
    /// Runs when the topic loses its last subscriber.
    pub on_last: TopicHook,
}

impl TopicHooks {
    /// Hooks from two closures.
    pub fn new(
        on_first: impl Fn() + Send + Sync + 'static,
        on_last: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_first: Arc::new(on_first),
            on_last: Arc::new(on_last),
        }
    }
}

type Subscribers = HashMap<ChannelId, Arc<ExtensionChannel>>;

/// Fan-out of notifications to subscribed channels.
pub struct SubscriptionBus {
    topics: Mutex<HashMap<String, Subscribers>>,
    hooks: RwLock<HashMap<String, TopicHooks>>,
    enabled: EnabledFlag,
}

impl SubscriptionBus {
    /// Empty bus. Publishing stops once `enabled` is switched off.
    pub fn new(enabled: EnabledFlag) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            hooks: RwLock::new(HashMap::new()),
            enabled,
        }
    }

    /// Install lifecycle hooks for `topic`, replacing earlier ones.
    pub fn set_hooks(&self, topic: impl Into<String>, hooks: TopicHooks) {
        let _ = self.hooks.write().insert(topic.into(), hooks);
    }

    /// Add `channel` to `topic`. Duplicate subscriptions are ignored.
    pub fn subscribe(&self, topic: &str, channel: &Arc<ExtensionChannel>) {
        let mut topics = self.topics.lock();
        if let Some(subscribers) = topics.get_mut(topic) {
            let _ = subscribers.insert(channel.id().clone(), Arc::clone(channel));
            return;
        }
        if let Some(hooks) = self.hooks.read().get(topic) {
            debug!(topic, "first subscriber, starting topic source");
            (hooks.on_first)();
        }
        let _ = topics.insert(
            topic.to_owned(),
            HashMap::from([(channel.id().clone(), Arc::clone(channel))]),
        );
    }

    /// Remove `channel` from `topic`. Non-members are ignored.
    pub fn unsubscribe(&self, topic: &str, channel_id: &ChannelId) {
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(topic) else {
            return;
        };
        if subscribers.remove(channel_id).is_none() || !subscribers.is_empty() {
            return;
        }
        let _ = topics.remove(topic);
        self.run_stop_hook(topic);
    }

    /// Drop `channel_id` from every topic, stopping topics that empty.
    /// Returns the topics it was subscribed to.
    pub fn remove_channel(&self, channel_id: &ChannelId) -> Vec<String> {
        let mut topics = self.topics.lock();
        let mut left = Vec::new();
        let mut emptied = Vec::new();
        for (topic, subscribers) in topics.iter_mut() {
            if subscribers.remove(channel_id).is_some() {
                left.push(topic.clone());
                if subscribers.is_empty() {
                    emptied.push(topic.clone());
                }
            }
        }
        for topic in &emptied {
            let _ = topics.remove(topic);
            self.run_stop_hook(topic);
        }
        left.sort();
        left
    }

    fn run_stop_hook(&self, topic: &str) {
        if let Some(hooks) = self.hooks.read().get(topic) {
            debug!(topic, "last subscriber gone, stopping topic source");
            (hooks.on_last)();
        }
    }

    /// Send `{kind: "notify-<topic>", args}` to every subscriber of `topic`.
    ///
    /// No-op while disabled or without subscribers. Returns the number of
    /// channels the frame was queued on.
    pub fn publish(&self, topic: &str, args: Vec<Value>) -> usize {
        if !self.enabled.is_enabled() {
            return 0;
        }
        let recipients: Vec<Arc<ExtensionChannel>> = match self.topics.lock().get(topic) {
            Some(subscribers) => subscribers.values().cloned().collect(),
            None => return 0,
        };
        let envelope = NotificationEnvelope::new(topic, args);
        let frame = match serde_json::to_string(&envelope) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(topic, error = %e, "failed to serialize notification");
                return 0;
            }
        };
        debug!(topic, recipients = recipients.len(), "publishing notification");
        recipients
            .iter()
            .filter(|channel| channel.send(Arc::clone(&frame)))
            .count()
    }

    /// Whether `topic` currently has subscribers.
    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.topics.lock().contains_key(topic)
    }

    /// Number of subscribers of `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, HashMap::len)
    }

    /// Active topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.lock().keys().cloned().collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn bus() -> SubscriptionBus {
        SubscriptionBus::new(EnabledFlag::new())
    }

    fn counting_hooks() -> (TopicHooks, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let (s, t) = (Arc::clone(&starts), Arc::clone(&stops));
        let hooks = TopicHooks::new(
            move || {
                let _ = s.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                let _ = t.fetch_add(1, Ordering::SeqCst);
            },
        );
        (hooks, starts, stops)
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[test]
    fn duplicate_subscribe_delivers_once() {
        let bus = bus();
        let (ch, mut rx) = ExtensionChannel::pair(8);
        bus.subscribe("t", &ch);
        bus.subscribe("t", &ch);
        assert_eq!(bus.publish("t", vec![json!(1)]), 1);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn unsubscribe_non_member_is_noop() {
        let bus = bus();
        let (hooks, _starts, stops) = counting_hooks();
        bus.set_hooks("t", hooks);
        let (a, _ra) = ExtensionChannel::pair(8);
        let (b, _rb) = ExtensionChannel::pair(8);
        bus.subscribe("t", &a);
        bus.unsubscribe("t", b.id());
        bus.unsubscribe("other", a.id());
        assert_eq!(bus.subscriber_count("t"), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn lifecycle_hooks_fire_once() {
        let bus = bus();
        let (hooks, starts, stops) = counting_hooks();
        bus.set_hooks("t", hooks);
        let chans: Vec<_> = (0..3).map(|_| ExtensionChannel::pair(8).0).collect();
        for ch in &chans {
            bus.subscribe("t", ch);
        }
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        for ch in &chans {
            bus.unsubscribe("t", ch.id());
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!bus.has_subscribers("t"));
        bus.subscribe("t", &chans[0]);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn publish_fans_out_identical_envelope() {
        let bus = bus();
        let (a, mut ra) = ExtensionChannel::pair(8);
        let (b, mut rb) = ExtensionChannel::pair(8);
        let (c, mut rc) = ExtensionChannel::pair(8);
        bus.subscribe("t", &a);
        bus.subscribe("t", &b);
        bus.subscribe("other", &c);
        assert_eq!(bus.publish("t", vec![json!("x"), json!(2)]), 2);
        let expected = json!({"kind": "notify-t", "args": ["x", 2]});
        assert_eq!(drain(&mut ra), vec![expected.clone()]);
        assert_eq!(drain(&mut rb), vec![expected]);
        assert!(drain(&mut rc).is_empty());
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        assert_eq!(bus().publish("nobody", vec![]), 0);
    }

    #[test]
    fn publish_when_disabled_is_noop() {
        let flag = EnabledFlag::new();
        let bus = SubscriptionBus::new(flag.clone());
        let (a, mut ra) = ExtensionChannel::pair(8);
        bus.subscribe("t", &a);
        let _ = flag.disable();
        assert_eq!(bus.publish("t", vec![]), 0);
        assert!(drain(&mut ra).is_empty());
    }

    #[test]
    fn remove_channel_stops_emptied_topics() {
        let bus = bus();
        let (hooks, _starts, stops) = counting_hooks();
        bus.set_hooks("solo", hooks);
        let (a, _ra) = ExtensionChannel::pair(8);
        let (b, _rb) = ExtensionChannel::pair(8);
        bus.subscribe("solo", &a);
        bus.subscribe("shared", &a);
        bus.subscribe("shared", &b);
        assert_eq!(bus.remove_channel(a.id()), vec!["shared", "solo"]);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(bus.topics(), vec!["shared"]);
    }
}
