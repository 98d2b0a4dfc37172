//! Chat platform abstraction: the three operations the agent needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// A message stored on the chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub text: String,
    /// Milliseconds since epoch.
    pub created_at: i64,
}

/// Participants and listing data for a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    #[serde(default)]
    pub participants: Vec<String>,
    /// Free-form platform metadata (listing title, price, status, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Parameters for one page of history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub user_id: String,
    pub channel_id: String,
    pub limit: u32,
    /// Only messages strictly older than this timestamp (ms); `None` = most recent.
    pub before: Option<i64>,
}

/// Chat platform client.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post `text` to `channel_id` as `sender_id`.
    async fn send_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<(), ChannelError>;

    /// Fetch one page of history, newest first.
    async fn fetch_history(&self, query: &HistoryQuery)
    -> Result<Vec<ChannelMessage>, ChannelError>;

    async fn get_channel_info(&self, channel_id: &str) -> Result<ChannelInfo, ChannelError>;
}
