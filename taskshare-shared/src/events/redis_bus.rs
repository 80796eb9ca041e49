/// Redis Pub/Sub publisher
///
/// Publishes the JSON wire form of each event on [`UPDATES_CHANNEL`], so
/// every API process subscribed to the channel can deliver it to its own
/// sessions.
use super::{EventPublisher, FanoutError, FanoutEvent, UPDATES_CHANNEL};
use crate::redis::RedisClient;
use async_trait::async_trait;
use redis::AsyncCommands;

#[derive(Clone)]
pub struct RedisPublisher {
    client: RedisClient,
}

impl RedisPublisher {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, event: &FanoutEvent) -> Result<(), FanoutError> {
        let message = serde_json::to_string(event)?;
        let mut conn = self.client.get_connection();

        let receivers: i64 = conn.publish(UPDATES_CHANNEL, message).await?;

        tracing::debug!(
            event_type = %event.event_type,
            recipients = event.user_ids.len(),
            receivers = receivers,
            "Published update"
        );
        Ok(())
    }
}
