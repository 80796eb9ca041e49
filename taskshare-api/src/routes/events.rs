/// Real-time updates (SSE)
///
/// The connection joins the routing group of the user resolved from its
/// bearer session; clients cannot pick another user's group. Every event
/// whose recipients include that user is forwarded verbatim.
///
/// Delivery is at-most-once with no backfill: a client that reconnects
/// must re-list its tasks to catch up.
///
/// # Endpoint
///
/// `GET /v1/events`
///
/// # SSE Event Format
///
/// ```text
/// event: update
/// data: {"userIds":["user:..."],"type":"TASK_UPDATED","payload":{"taskId":"task:...","isCompleted":true}}
/// ```
///
/// # Example
///
/// ```bash
/// curl -N -H "Authorization: Bearer <token>" http://localhost:4000/v1/events
/// ```
use crate::{app::AppState, middleware::auth::AuthContext};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use taskshare_shared::events::{FanoutEvent, SessionId, SessionRegistry};
use tokio_stream::{wrappers::ReceiverStream, StreamExt as _};

/// Removes the session from the registry when the stream is dropped
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    user_id: String,
    id: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.user_id, self.id);
        tracing::info!(user_id = %self.user_id, "Event stream closed");
    }
}

fn to_sse(event: &FanoutEvent) -> Event {
    Event::default()
        .event("update")
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, event_type = %event.event_type, "Failed to encode update");
            Event::default().comment("encode error")
        })
}

pub async fn stream_updates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, receiver) = state.registry.register(&auth.user_id);
    let guard = SessionGuard {
        registry: state.registry.clone(),
        user_id: auth.user_id.clone(),
        id,
    };

    tracing::info!(user_id = %auth.user_id, "Event stream opened");

    let stream = ReceiverStream::new(receiver).map(move |event| {
        let _session = &guard;
        Ok(to_sse(&event))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(25)))
}
