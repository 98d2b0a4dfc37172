//! Per-conversation session state.
//!
//! A `Session` is built for one inbound message, owned by that one agent
//! loop invocation, and handed to tools as `&mut Session`. It is never
//! stored on a long-lived object.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::Database;

/// Identity and mutable state of one conversation turn.
pub struct Session {
    id: Uuid,
    channel_id: String,
    /// Identity the agent acts as (replies are sent from here).
    sender_id: String,
    /// The other party in the conversation.
    counterpart_id: String,
    ended: bool,
    next_cursor: Option<i64>,
    store: Arc<dyn Database>,
}

impl Session {
    pub fn new(
        id: Uuid,
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        counterpart_id: impl Into<String>,
        store: Arc<dyn Database>,
    ) -> Self {
        Self {
            id,
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            counterpart_id: counterpart_id.into(),
            ended: false,
            next_cursor: None,
            store,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }

    /// End the session.
    ///
    /// Returns `Ok(true)` when this call ended the session and `Ok(false)`
    /// when it was already ended, in which case the store is not touched.
    /// The flag only flips after the store confirms, so a failed call leaves
    /// the session open and safe to retry.
    pub async fn end(&mut self) -> Result<bool, DatabaseError> {
        if self.ended {
            return Ok(false);
        }
        self.store.end_session(self.id).await?;
        self.ended = true;
        tracing::info!(session_id = %self.id, channel_id = %self.channel_id, "Session ended");
        Ok(true)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Record the paging cursor; the most recent fetch wins.
    pub fn save_next_message_timestamp(&mut self, ts: i64) {
        self.next_cursor = Some(ts);
    }

    pub fn next_message_timestamp(&self) -> Option<i64> {
        self.next_cursor
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("sender_id", &self.sender_id)
            .field("counterpart_id", &self.counterpart_id)
            .field("ended", &self.ended)
            .field("next_cursor", &self.next_cursor)
            .finish_non_exhaustive()
    }
}
