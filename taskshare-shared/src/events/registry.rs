/// Registry of live sessions, grouped by user id
///
/// Constructed once at startup and shared by reference between the
/// real-time endpoint (which registers and unregisters sessions) and the
/// distributor (which broadcasts). Reads during broadcast never block on
/// each other; registration only locks the shard of one user id.
///
/// Each session owns a bounded buffer. [`SessionRegistry::broadcast`] never
/// waits: a full buffer drops the event for that session and a closed one
/// is pruned.
///
/// # Example
///
/// ```
/// use taskshare_shared::events::{EventType, FanoutEvent, SessionRegistry};
/// use serde_json::json;
///
/// # async fn example() {
/// let registry = SessionRegistry::new(16);
/// let (_id, mut rx) = registry.register("user:a");
///
/// let event = FanoutEvent::new(vec!["user:a".into()], EventType::TaskUpdated, json!({}));
/// assert_eq!(registry.broadcast(&event), 1);
/// assert_eq!(rx.recv().await.unwrap().event_type, EventType::TaskUpdated);
/// # }
/// ```
use super::FanoutEvent;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Identifies one connection within the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

#[derive(Debug)]
struct SessionSink {
    id: SessionId,
    sender: mpsc::Sender<Arc<FanoutEvent>>,
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Vec<SessionSink>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl SessionRegistry {
    /// `buffer` is the number of undelivered events each session may hold
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Adds a session to the routing group of `user_id`
    pub fn register(&self, user_id: &str) -> (SessionId, mpsc::Receiver<Arc<FanoutEvent>>) {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.buffer);

        self.sessions
            .entry(user_id.to_string())
            .or_default()
            .push(SessionSink { id, sender });

        tracing::debug!(user_id = %user_id, session = id.0, "Session registered");
        (id, receiver)
    }

    /// Removes one session; the group disappears with its last session
    pub fn unregister(&self, user_id: &str, id: SessionId) {
        if let Some(mut sinks) = self.sessions.get_mut(user_id) {
            sinks.retain(|s| s.id != id);
        }
        self.sessions.remove_if(user_id, |_, sinks| sinks.is_empty());

        tracing::debug!(user_id = %user_id, session = id.0, "Session unregistered");
    }

    /// Delivers `event` to every live session of its recipients
    ///
    /// Duplicate recipient ids receive the event once. Returns the number of
    /// sessions the event was queued for.
    pub fn broadcast(&self, event: &FanoutEvent) -> usize {
        let shared = Arc::new(event.clone());
        let mut delivered = 0;
        let mut stale = Vec::new();
        let mut seen = HashSet::new();

        for user_id in &event.user_ids {
            if !seen.insert(user_id.as_str()) {
                continue;
            }
            let Some(sinks) = self.sessions.get(user_id) else {
                continue;
            };

            for sink in sinks.iter() {
                match sink.sender.try_send(shared.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            user_id = %user_id,
                            session = sink.id.0,
                            event_type = %event.event_type,
                            "Session buffer full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => stale.push((user_id.clone(), sink.id)),
                }
            }
        }

        for (user_id, id) in stale {
            self.unregister(&user_id, id);
        }

        delivered
    }

    /// Drops every session; their receivers then observe end of stream
    pub fn close_all(&self) {
        let users = self.sessions.len();
        self.sessions.clear();
        tracing::debug!(users, "All sessions closed");
    }

    /// Number of live sessions for one user
    pub fn session_count(&self, user_id: &str) -> usize {
        self.sessions.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of users with at least one session
    pub fn online_users(&self) -> usize {
        self.sessions.len()
    }
}
