/// Recipient-scoped change notifications
///
/// Every mutating task operation publishes one [`FanoutEvent`] naming the
/// users entitled to see it. A distributor consumes the bus and hands each
/// event to the [`registry::SessionRegistry`], which delivers it to every
/// live session of each listed user.
///
/// # Architecture
///
/// ```text
/// TaskService ──publish──> EventPublisher ──> LocalBus (broadcast)  ─┐
///                                         └─> RedisPublisher        │
///                                              PUBLISH channel:updates
///                                                        │          │
///                              distributor <─ SUBSCRIBE ─┘ <────────┘
///                                   │
///                                   ▼
///                           SessionRegistry ──try_send──> session buffers (SSE)
/// ```
///
/// Delivery is at-most-once: a session that is offline, slow or closed
/// misses the event and there is no replay. Clients re-query their task list
/// after reconnecting.
///
/// # Wire format
///
/// ```json
/// { "userIds": ["user:a", "user:b"], "type": "TASK_UPDATED", "payload": { "taskId": "task:1" } }
/// ```
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub mod activity;
pub mod bus;
pub mod distributor;
pub mod redis_bus;
pub mod registry;

pub use activity::{
    record_activity, ActivityEntry, ActivityError, ActivityLog, MemoryActivityLog, StreamActivityLog,
};
pub use bus::LocalBus;
pub use distributor::{run_local_distributor, run_redis_distributor};
pub use redis_bus::RedisPublisher;
pub use registry::{SessionId, SessionRegistry};

/// Redis Pub/Sub channel carrying fanout events between processes
pub const UPDATES_CHANNEL: &str = "channel:updates";

/// Kind of change an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    SubtaskAdded,
    SubtaskUpdated,
    TaskShared,
    InviteAccepted,
    InviteDeclined,
    ShareRoleUpdated,
    AccessRevoked,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TaskCreated => "TASK_CREATED",
            EventType::TaskUpdated => "TASK_UPDATED",
            EventType::TaskDeleted => "TASK_DELETED",
            EventType::SubtaskAdded => "SUBTASK_ADDED",
            EventType::SubtaskUpdated => "SUBTASK_UPDATED",
            EventType::TaskShared => "TASK_SHARED",
            EventType::InviteAccepted => "INVITE_ACCEPTED",
            EventType::InviteDeclined => "INVITE_DECLINED",
            EventType::ShareRoleUpdated => "SHARE_ROLE_UPDATED",
            EventType::AccessRevoked => "ACCESS_REVOKED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change notification with its explicit recipient list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutEvent {
    pub user_ids: Vec<String>,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub payload: Value,
}

impl FanoutEvent {
    pub fn new(user_ids: Vec<String>, event_type: EventType, payload: Value) -> Self {
        Self {
            user_ids,
            event_type,
            payload,
        }
    }
}

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Redis publish failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis client error: {0}")]
    Client(#[from] crate::redis::RedisClientError),
}

/// Hands events to the distribution layer
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &FanoutEvent) -> Result<(), FanoutError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let event = FanoutEvent::new(
            vec!["user:a".to_string()],
            EventType::ShareRoleUpdated,
            json!({ "taskId": "task:1" }),
        );

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(
            encoded,
            json!({
                "userIds": ["user:a"],
                "type": "SHARE_ROLE_UPDATED",
                "payload": { "taskId": "task:1" }
            })
        );

        let decoded: FanoutEvent = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_display_matches_serde() {
        for event_type in [EventType::TaskUpdated, EventType::AccessRevoked] {
            let serialized = serde_json::to_value(event_type).unwrap();
            assert_eq!(serialized, json!(event_type.to_string()));
        }
    }
}
