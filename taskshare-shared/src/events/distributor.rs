/// Distributor loops
///
/// A distributor consumes the event bus and hands every event to the
/// [`SessionRegistry`]. Exactly one runs per API process, spawned at
/// startup and stopped through its `CancellationToken`.
use super::{FanoutEvent, FanoutError, SessionRegistry, UPDATES_CHANNEL};
use crate::redis::RedisClient;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Delay before re-subscribing after the Redis connection drops
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Distributes events from the in-process bus until cancelled
pub async fn run_local_distributor(
    mut receiver: broadcast::Receiver<FanoutEvent>,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) {
    tracing::info!("Local event distributor started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(event) => {
                    let delivered = registry.broadcast(&event);
                    tracing::trace!(event_type = %event.event_type, delivered, "Event distributed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Distributor lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    tracing::info!("Local event distributor stopped");
}

/// Distributes events published on Redis until cancelled
///
/// Re-subscribes after connection loss. Events published while the
/// subscription is down are lost.
pub async fn run_redis_distributor(
    client: RedisClient,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) {
    tracing::info!(channel = UPDATES_CHANNEL, "Redis event distributor started");

    while !shutdown.is_cancelled() {
        if let Err(e) = listen(&client, &registry, &shutdown).await {
            tracing::error!(error = %e, "Update subscription failed");
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
        }
    }

    tracing::info!("Redis event distributor stopped");
}

async fn listen(
    client: &RedisClient,
    registry: &SessionRegistry,
    shutdown: &CancellationToken,
) -> Result<(), FanoutError> {
    let mut pubsub = client.pubsub().await?;
    pubsub.subscribe(UPDATES_CHANNEL).await?;

    tracing::info!(channel = UPDATES_CHANNEL, "Listening for updates");

    let messages = pubsub.on_message();
    tokio::pin!(messages);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            message = messages.next() => {
                let Some(message) = message else {
                    tracing::warn!("Update stream ended");
                    return Ok(());
                };

                let payload: String = match message.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read update payload");
                        continue;
                    }
                };

                match serde_json::from_str::<FanoutEvent>(&payload) {
                    Ok(event) => {
                        registry.broadcast(&event);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, payload = %payload, "Failed to parse update");
                    }
                }
            }
        }
    }
}
