//! Event pumps: topic hooks that forward host event streams into the bus.
//!
//! The start hook subscribes to one or more `broadcast` senders owned by a
//! host collaborator and spawns a task that maps each event to notification
//! arguments and publishes them. The stop hook aborts that task, which drops
//! the receivers and detaches from the source.

use std::sync::{Arc, Weak};

use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::bus::{SubscriptionBus, TopicHooks};

/// Builds [`TopicHooks`] that pump host events into `topic`.
pub struct EventPump<T> {
    topic: String,
    source: Arc<dyn Fn() -> Vec<broadcast::Receiver<T>> + Send + Sync>,
    map: Arc<dyn Fn(T) -> Option<Vec<Value>> + Send + Sync>,
    on_start: Option<Arc<dyn Fn() + Send + Sync>>,
    on_stop: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T: Clone + Send + 'static> EventPump<T> {
    /// Pump a single event stream.
    pub fn single(
        topic: impl Into<String>,
        source: impl Fn() -> broadcast::Receiver<T> + Send + Sync + 'static,
        map: impl Fn(T) -> Option<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self::aggregate(topic, move || vec![source()], map)
    }

    /// Pump the merged streams of every live model of a kind.
    pub fn aggregate(
        topic: impl Into<String>,
        source: impl Fn() -> Vec<broadcast::Receiver<T>> + Send + Sync + 'static,
        map: impl Fn(T) -> Option<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            topic: topic.into(),
            source: Arc::new(source),
            map: Arc::new(map),
            on_start: None,
            on_stop: None,
        }
    }

    /// Extra work after the pump starts.
    #[must_use]
    pub fn on_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Extra work before the pump stops.
    #[must_use]
    pub fn on_stop(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(f));
        self
    }

    /// Install the hooks on `bus`.
    pub fn install(self, bus: &Arc<SubscriptionBus>) {
        let topic = self.topic.clone();
        let hooks = self.into_hooks(Arc::downgrade(bus));
        bus.set_hooks(topic, hooks);
    }

    fn into_hooks(self, bus: Weak<SubscriptionBus>) -> TopicHooks {
        let task: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
        let Self {
            topic,
            source,
            map,
            on_start,
            on_stop,
        } = self;

        let start_task = Arc::clone(&task);
        let start = move || {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(topic = %topic, "no tokio runtime, event pump not started");
                return;
            };
            let receivers = source();
            debug!(topic = %topic, sources = receivers.len(), "starting event pump");
            let handle = runtime.spawn(run_pump(
                topic.clone(),
                receivers,
                Arc::clone(&map),
                bus.clone(),
            ));
            if let Some(previous) = start_task.lock().replace(handle) {
                previous.abort();
            }
            if let Some(f) = &on_start {
                f();
            }
        };

        let stop = move || {
            if let Some(f) = &on_stop {
                f();
            }
            if let Some(handle) = task.lock().take() {
                handle.abort();
            }
        };

        TopicHooks::new(start, stop)
    }
}

async fn run_pump<T: Clone + Send + 'static>(
    topic: String,
    receivers: Vec<broadcast::Receiver<T>>,
    map: Arc<dyn Fn(T) -> Option<Vec<Value>> + Send + Sync>,
    bus: Weak<SubscriptionBus>,
) {
    let mut events = futures::stream::select_all(receivers.into_iter().map(BroadcastStream::new));
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let Some(args) = map(event) else { continue };
                let Some(bus) = bus.upgrade() else { break };
                let _ = bus.publish(&topic, args);
            }
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!(topic = %topic, lagged = n, "event pump lagged");
            }
        }
    }
    debug!(topic = %topic, "event pump sources closed");
}
