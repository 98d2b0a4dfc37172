//! Advisory activity events.
//!
//! Tools report what they did through `ActivityRecorder::emit`. The event is
//! broadcast to any live subscribers, then written once to the store.
//! Failures are logged and never reach the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::agent::session::Session;
use crate::store::{ActivityKind, Database};

/// Capacity of the live activity channel.
const ACTIVITY_CHANNEL_CAPACITY: usize = 256;

/// Something a tool did, for the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    pub session_id: Uuid,
    pub channel_id: String,
    pub kind: ActivityKind,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn for_session(session: &Session, kind: ActivityKind, payload: serde_json::Value) -> Self {
        Self {
            session_id: session.id(),
            channel_id: session.channel_id().to_string(),
            kind,
            payload,
            at: Utc::now(),
        }
    }
}

/// Emits activity events to subscribers and the store.
#[derive(Clone)]
pub struct ActivityRecorder {
    store: Arc<dyn Database>,
    events_tx: broadcast::Sender<ActivityEvent>,
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn Database>) -> Self {
        let (events_tx, _) = broadcast::channel(ACTIVITY_CHANNEL_CAPACITY);
        Self { store, events_tx }
    }

    /// Subscribe to live activity events.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.events_tx.subscribe()
    }

    /// Attempt to record the event once.
    ///
    /// Awaited inline so trail order matches execution order.
    pub async fn emit(&self, event: ActivityEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event.clone());

        if let Err(e) = self
            .store
            .record_activity(event.session_id, &event.channel_id, event.kind, &event.payload)
            .await
        {
            tracing::warn!(
                session_id = %event.session_id,
                kind = %event.kind,
                error = %e,
                "Failed to persist activity event"
            );
        }
    }
}
