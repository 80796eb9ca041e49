/// In-process event bus
///
/// A `tokio::sync::broadcast` channel. Used when the API runs as a single
/// process; the local distributor is its only subscriber in production.
use super::{EventPublisher, FanoutError, FanoutEvent};
use async_trait::async_trait;
use tokio::sync::broadcast;

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<FanoutEvent>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FanoutEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for LocalBus {
    async fn publish(&self, event: &FanoutEvent) -> Result<(), FanoutError> {
        // No subscribers means no connected sessions; the event is simply dropped
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!(event_type = %event.event_type, "No bus subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = LocalBus::new(8);
        let mut rx = bus.subscribe();

        let event = FanoutEvent::new(vec!["user:a".into()], EventType::TaskCreated, json!({}));
        bus.publish(&event).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = LocalBus::new(8);
        let event = FanoutEvent::new(vec![], EventType::TaskDeleted, json!({}));
        assert!(bus.publish(&event).await.is_ok());
    }
}
