//! Internal Event Channel
//!
//! Typed publish/subscribe channel connecting the connection manager and the
//! subtitle service. All cross-component coordination flows through these
//! events; neither component reaches into the other's state.

use crate::protocol::SubtitleResult;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Events published on the internal bus
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A caller issued an extraction request
    ExtractionRequested {
        request_id: String,
        video_url: String,
    },
    /// The extension reported a result for some request
    ResultReceived(SubtitleResult),
    /// The extension attached to the bridge
    ExtensionAttached { peer: SocketAddr },
    /// The extension detached from the bridge
    ExtensionDetached,
}

/// Broadcast-based event bus shared by all components
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Create an event bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BridgeEvent) {
        // A send error only means nobody is subscribed yet
        if self.tx.send(event).is_err() {
            tracing::debug!("Event published with no active subscribers");
        }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(BridgeEvent::ExtensionDetached);

        match rx.recv().await.unwrap() {
            BridgeEvent::ExtensionDetached => {}
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish(BridgeEvent::ExtensionDetached);
    }

    #[tokio::test]
    async fn test_events_delivered_in_publish_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        for i in 0..3 {
            bus.publish(BridgeEvent::ExtractionRequested {
                request_id: format!("req-{}", i),
                video_url: "url".to_string(),
            });
        }

        for i in 0..3 {
            match rx.recv().await.unwrap() {
                BridgeEvent::ExtractionRequested { request_id, .. } => {
                    assert_eq!(request_id, format!("req-{}", i));
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
