/// Operations exposed to the HTTP shell
///
/// - [`tasks::TaskService`]: task lifecycle, update/merge protocol and the
///   sharing transitions
/// - [`accounts::AccountService`]: signup, login and session resolution
///
/// Services own `Arc`s of their collaborators, so they are cheap to clone
/// into request handlers.
use crate::events::{EventPublisher, EventType, FanoutEvent};
use serde_json::Value;
use std::sync::Arc;

pub mod accounts;
pub mod tasks;

pub use accounts::{AccountService, LoginOutcome, NewAccount};
pub use tasks::{TaskService, TaskServiceConfig};

/// Fire-and-forget wrapper over an [`EventPublisher`]
///
/// The document change is already committed when an event is published, so
/// publish failures are logged and swallowed.
#[derive(Clone)]
pub struct Notifier {
    publisher: Arc<dyn EventPublisher>,
}

impl Notifier {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    pub async fn notify(&self, user_ids: Vec<String>, event_type: EventType, payload: Value) {
        let event = FanoutEvent::new(user_ids, event_type, payload);
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                event_type = %event.event_type,
                recipients = event.user_ids.len(),
                error = %e,
                "Failed to publish update"
            );
        }
    }
}
