//! Notification subscription handlers.

use async_trait::async_trait;
use exthost_core::ExtensionError;
use serde::Deserialize;
use tracing::instrument;

use crate::dispatcher::{CallContext, CommandHandler, Reply};

/// Params of `subscribe` and `unsubscribe`.
#[derive(Debug, Deserialize)]
pub struct TopicParams {
    /// Notification topic.
    #[serde(rename = "type")]
    pub topic: String,
}

/// Adds the calling channel to a topic.
pub struct SubscribeHandler;

#[async_trait]
impl CommandHandler for SubscribeHandler {
    type Params = TopicParams;

    #[instrument(skip(self, call), fields(command = "subscribe"))]
    async fn handle(&self, params: TopicParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        call.broker.bus.subscribe(&params.topic, &call.channel);
        Ok(Reply::Empty)
    }
}

/// Removes the calling channel from a topic.
pub struct UnsubscribeHandler;

#[async_trait]
impl CommandHandler for UnsubscribeHandler {
    type Params = TopicParams;

    #[instrument(skip(self, call), fields(command = "unsubscribe"))]
    async fn handle(&self, params: TopicParams, call: &CallContext) -> Result<Reply, ExtensionError> {
        call.broker.bus.unsubscribe(&params.topic, call.channel.id());
        Ok(Reply::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_helpers::{call_context, drain, make_test_context, params};
    use serde_json::json;

    #[tokio::test]
    async fn subscribed_channel_receives_notifications() {
        let (ctx, _host) = make_test_context();
        let (call, mut rx) = call_context(&ctx, "subscribe");
        let reply = SubscribeHandler
            .handle(params(json!({"type": "view-shown-p1"})), &call)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Empty);
        assert_eq!(ctx.bus.publish("view-shown-p1", vec![json!(3)]), 1);
        assert_eq!(
            drain(&mut rx),
            vec![json!({"kind": "notify-view-shown-p1", "args": [3]})]
        );

        let _ = UnsubscribeHandler
            .handle(params(json!({"type": "view-shown-p1"})), &call)
            .await
            .unwrap();
        assert!(!ctx.bus.has_subscribers("view-shown-p1"));
        assert_eq!(ctx.bus.publish("view-shown-p1", vec![]), 0);
    }

    #[tokio::test]
    async fn unsubscribe_without_subscription_is_quiet() {
        let (ctx, _host) = make_test_context();
        let (call, _rx) = call_context(&ctx, "unsubscribe");
        let reply = UnsubscribeHandler
            .handle(params(json!({"type": "never"})), &call)
            .await
            .unwrap();
        assert_eq!(reply, Reply::Empty);
    }
}
