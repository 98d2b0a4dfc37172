//! Unified `Database` trait: single async interface for all persistence.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// What a tool did, for the activity trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    MessageSent,
    MessagesFetched,
    PurchaseIntent,
    SessionEnded,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::MessageSent => "message_sent",
            ActivityKind::MessagesFetched => "messages_fetched",
            ActivityKind::PurchaseIntent => "purchase_intent",
            ActivityKind::SessionEnded => "session_ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message_sent" => Some(ActivityKind::MessageSent),
            "messages_fetched" => Some(ActivityKind::MessagesFetched),
            "purchase_intent" => Some(ActivityKind::PurchaseIntent),
            "session_ended" => Some(ActivityKind::SessionEnded),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted activity row.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub channel_id: String,
    pub kind: ActivityKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A purchase intent about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchaseIntent {
    pub session_id: Uuid,
    pub channel_id: String,
    pub user_id: String,
    pub item_name: String,
    /// Free text as the buyer stated it ("200", "$180 obo", ...).
    pub item_price: String,
    pub intent: String,
    /// Percentage in `[0, 100]`.
    pub confidence: Option<f64>,
}

/// A persisted purchase intent.
#[derive(Debug, Clone)]
pub struct PurchaseIntentRecord {
    pub id: Uuid,
    pub intent: NewPurchaseIntent,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic persistence for sessions, activity, and purchase intents.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Sessions ────────────────────────────────────────────────────

    /// Mark a session as ended.
    async fn end_session(&self, session_id: Uuid) -> Result<(), DatabaseError>;

    async fn is_session_ended(&self, session_id: Uuid) -> Result<bool, DatabaseError>;

    // ── Activity ────────────────────────────────────────────────────

    async fn record_activity(
        &self,
        session_id: Uuid,
        channel_id: &str,
        kind: ActivityKind,
        payload: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Activity for a session, oldest first.
    async fn list_activities(&self, session_id: Uuid)
    -> Result<Vec<ActivityRecord>, DatabaseError>;

    // ── Purchase intents ────────────────────────────────────────────

    /// Insert a purchase intent. Returns the generated id.
    async fn create_purchase_intent(
        &self,
        intent: &NewPurchaseIntent,
    ) -> Result<Uuid, DatabaseError>;

    async fn list_purchase_intents(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<PurchaseIntentRecord>, DatabaseError>;
}
