//! Extension session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use exthost_broker::{Broker, ExtensionChannel};
use exthost_core::InboundMessage;
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::server::AppState;

/// How long the writer gets to flush and send a close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// What the session does after an inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep reading.
    Continue,
    /// The handshake was refused; close the socket.
    Reject,
}

/// Handle one inbound text frame on `channel`.
///
/// Malformed frames are logged and dropped. The handshake binds the channel
/// to `origin_claim`, the `Origin` of the upgrade request; everything else
/// goes to the broker, which ignores commands on unbound channels.
pub async fn handle_text_frame(
    text: &str,
    origin_claim: &str,
    broker: &Broker,
    channel: &Arc<ExtensionChannel>,
) -> FrameOutcome {
    let message = match InboundMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(channel = %channel.id(), error = %e, len = text.len(), "dropping malformed frame");
            return FrameOutcome::Continue;
        }
    };

    if message.is_handshake() {
        let was_bound = channel.is_bound();
        if broker.bind_channel(origin_claim, channel) || was_bound {
            return FrameOutcome::Continue;
        }
        return FrameOutcome::Reject;
    }

    let _ = broker.dispatch(channel, message).await;
    FrameOutcome::Continue
}

/// Run one extension channel over `ws` until either side goes away.
///
/// 1. Opens an [`ExtensionChannel`] whose outbound queue feeds a writer task
/// 2. The writer also pings every `ping_interval`
/// 3. Text (or UTF-8 binary) frames are handled in order via [`handle_text_frame`]
/// 4. On disconnect, refused handshake or shutdown the broker forgets the channel
#[instrument(skip_all, fields(channel))]
pub async fn run_extension_session(ws: WebSocket, origin_claim: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (channel, mut outbound) = ExtensionChannel::pair(state.config.channel_buffer);
    let _ = tracing::Span::current().record("channel", channel.id().as_str());

    let open = state.channels.fetch_add(1, Ordering::Relaxed) + 1;
    info!(origin = %origin_claim, open, "extension socket connected");

    let closing = CancellationToken::new();
    let writer_closing = closing.clone();
    let ping_every = state.config.ping_interval;
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_every);
        // first tick fires immediately
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                () = writer_closing.cancelled() => {
                    while let Ok(frame) = outbound.try_recv() {
                        if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                            return;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let shutdown = state.shutdown.token();
    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => {
                debug!("server shutting down, closing extension socket");
                break;
            }
            next = ws_rx.next() => next,
        };
        let Some(Ok(msg)) = next else { break };

        let outcome = match msg {
            Message::Text(text) => {
                handle_text_frame(text.as_str(), &origin_claim, &state.broker, &channel).await
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_text_frame(text, &origin_claim, &state.broker, &channel).await,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF-8 binary frame");
                    FrameOutcome::Continue
                }
            },
            Message::Close(_) => {
                info!("extension sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => FrameOutcome::Continue,
        };

        if outcome == FrameOutcome::Reject {
            break;
        }
    }

    state.broker.channel_closed(&channel);
    closing.cancel();
    let abort = writer.abort_handle();
    if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
        abort.abort();
    }
    let open = state.channels.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
    info!(
        origin = %origin_claim,
        bound = channel.is_bound(),
        dropped = channel.drop_count(),
        open,
        "extension socket disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use exthost_broker::MemoryHost;
    use exthost_settings::{ExtHostSettings, ExtensionDescriptor};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    const EXT: &str = "chrome-extension://abcdef";

    fn boot() -> Arc<Broker> {
        let host = Arc::new(MemoryHost::new());
        let broker = Broker::new(ExtHostSettings::default(), host.services());
        let _ = broker
            .add_extension(&ExtensionDescriptor::new(format!("{EXT}/devtools.html")))
            .unwrap();
        broker
    }

    fn frames(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn handshake_then_command() {
        let broker = boot();
        let (channel, mut rx) = ExtensionChannel::pair(8);

        let outcome = handle_text_frame(r#"{"command":"registerExtension"}"#, EXT, &broker, &channel).await;
        assert_eq!(outcome, FrameOutcome::Continue);
        assert!(channel.is_bound());

        let create = json!({"command": "createPanel", "requestId": 1, "id": "p1", "title": "P"});
        let _ = handle_text_frame(&create.to_string(), EXT, &broker, &channel).await;
        let replies = frames(&mut rx);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["kind"], "callback");
        assert_eq!(replies[0]["requestId"], 1);
        assert_eq!(replies[0]["result"]["code"], "OK");
    }

    #[tokio::test]
    async fn forged_origin_is_rejected() {
        let broker = boot();
        let (channel, mut rx) = ExtensionChannel::pair(8);
        let outcome = handle_text_frame(
            r#"{"command":"registerExtension"}"#,
            "chrome-extension://forged",
            &broker,
            &channel,
        )
        .await;
        assert_eq!(outcome, FrameOutcome::Reject);
        assert!(!channel.is_bound());
        assert!(frames(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn repeated_handshake_keeps_binding() {
        let broker = boot();
        let (channel, _rx) = ExtensionChannel::pair(8);
        let hello = r#"{"command":"registerExtension"}"#;
        assert_eq!(handle_text_frame(hello, EXT, &broker, &channel).await, FrameOutcome::Continue);
        assert_eq!(handle_text_frame(hello, EXT, &broker, &channel).await, FrameOutcome::Continue);
        assert_eq!(channel.origin().map(|o| o.as_str().to_owned()), Some(EXT.to_owned()));
    }

    #[tokio::test]
    async fn commands_before_handshake_are_dropped() {
        let broker = boot();
        let (channel, mut rx) = ExtensionChannel::pair(8);
        let create = json!({"command": "createPanel", "requestId": 1, "id": "p1", "title": "P"});
        let _ = handle_text_frame(&create.to_string(), EXT, &broker, &channel).await;
        assert!(frames(&mut rx).is_empty());
        assert_eq!(broker.stats().objects, 0);
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let broker = boot();
        let (channel, mut rx) = ExtensionChannel::pair(8);
        for text in ["not json", "[]", r#"{"requestId": 3}"#, r#"{"command": 7}"#] {
            assert_eq!(handle_text_frame(text, EXT, &broker, &channel).await, FrameOutcome::Continue);
        }
        assert!(!channel.is_bound());
        assert!(frames(&mut rx).is_empty());
    }
}
