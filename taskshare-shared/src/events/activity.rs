/// Activity log
///
/// An append-only audit trail of mutating operations. Entries are written
/// to the Redis stream `stream:task_events` with `XADD`, retried with
/// exponential backoff, or kept in a bounded in-process buffer when running
/// without Redis.
///
/// The log is best effort: callers go through [`record_activity`], which
/// logs failures and never lets them fail the operation that produced the
/// entry.
use crate::redis::RedisClient;
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

pub const ACTIVITY_STREAM_KEY: &str = "stream:task_events";

const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error("Failed to append activity after {attempts} attempts: {last_error}")]
    WriteFailed { attempts: u32, last_error: String },

    #[error("Activity buffer unavailable")]
    BufferPoisoned,
}

/// One audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub user_id: String,

    /// `CREATE_TASK`, `UPDATE_TASK`, `SHARE_TASK`, ...
    pub action: String,

    pub metadata: Value,

    /// Milliseconds since the epoch
    pub timestamp: i64,
}

impl ActivityEntry {
    pub fn now(user_id: impl Into<String>, action: impl Into<String>, metadata: Value) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            metadata,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    fn stream_fields(&self) -> [(&'static str, String); 4] {
        [
            ("userId", self.user_id.clone()),
            ("action", self.action.clone()),
            ("metadata", self.metadata.to_string()),
            ("timestamp", self.timestamp.to_string()),
        ]
    }
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), ActivityError>;
}

/// Appends an entry, logging instead of returning failures
pub async fn record_activity(log: &dyn ActivityLog, entry: ActivityEntry) {
    if let Err(e) = log.append(&entry).await {
        tracing::error!(
            user_id = %entry.user_id,
            action = %entry.action,
            error = %e,
            "Failed to record activity"
        );
    }
}

/// Bounded in-process activity buffer; the oldest entries fall off first
#[derive(Debug)]
pub struct MemoryActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
    capacity: usize,
}

impl Default for MemoryActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot of the buffered entries, oldest first
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), ActivityError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ActivityError::BufferPoisoned)?;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        Ok(())
    }
}

/// Retry behaviour for stream appends
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Redis stream activity log
#[derive(Clone)]
pub struct StreamActivityLog {
    client: RedisClient,
    policy: RetryPolicy,
}

impl StreamActivityLog {
    pub fn new(client: RedisClient) -> Self {
        let policy = RetryPolicy {
            max_retries: client.config().max_retries,
            ..RetryPolicy::default()
        };
        Self { client, policy }
    }

    pub fn with_policy(client: RedisClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl ActivityLog for StreamActivityLog {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), ActivityError> {
        let fields = entry.stream_fields();
        let mut attempt = 0;

        loop {
            let mut conn = self.client.get_connection();
            let result: Result<String, redis::RedisError> =
                conn.xadd(ACTIVITY_STREAM_KEY, "*", &fields).await;

            match result {
                Ok(stream_id) => {
                    tracing::trace!(action = %entry.action, stream_id = %stream_id, "Activity recorded");
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.policy.max_retries {
                        return Err(ActivityError::WriteFailed {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        stream_key = ACTIVITY_STREAM_KEY,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "XADD failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
