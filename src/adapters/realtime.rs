//! In-process broadcast hub for realtime fan-out.
//!
//! Price deltas, activation changes, and per-owner alert events all flow
//! through one `tokio::sync::broadcast` channel; the websocket layer that
//! faces browsers subscribes here and filters by topic. Publishing with no
//! subscribers is a no-op, not an error.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::ports::RealtimeBroadcast;

/// One published frame: a topic plus its JSON payload
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    pub topic: String,
    pub payload: serde_json::Value,
}

pub struct BroadcastHub {
    tx: broadcast::Sender<OutboundFrame>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundFrame> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RealtimeBroadcast for BroadcastHub {
    async fn publish(&self, topic: &str, payload: serde_json::Value) {
        let frame = OutboundFrame {
            topic: topic.to_string(),
            payload,
        };
        // send only fails when nobody is listening
        if self.tx.send(frame).is_err() {
            trace!(topic, "no realtime subscribers, frame dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_frames() {
        let hub = BroadcastHub::new(8);
        let mut rx = hub.subscribe();

        hub.publish("prices", json!({"symbols": ["AAPL"]})).await;

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.topic, "prices");
        assert_eq!(frame.payload["symbols"][0], "AAPL");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = BroadcastHub::new(8);
        hub.publish("activation", json!({"state": "standby"})).await;
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn each_subscriber_gets_its_own_copy() {
        let hub = BroadcastHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish("alerts:42", json!({"symbol": "MSFT"})).await;

        assert_eq!(a.recv().await.unwrap().topic, "alerts:42");
        assert_eq!(b.recv().await.unwrap().topic, "alerts:42");
    }
}
