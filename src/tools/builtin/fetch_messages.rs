//! History paging tool.
//!
//! Each call returns one page (newest first) and moves the session cursor
//! to the oldest message in that page, so the next call pages further back.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agent::activity::{ActivityEvent, ActivityRecorder};
use crate::agent::session::Session;
use crate::channels::{ChatClient, HistoryQuery};
use crate::error::ToolError;
use crate::store::ActivityKind;
use crate::tools::tool::{
    Tool, ToolArgs, ToolOutcome, ToolOutput, decode_args, mismatched_args,
};

pub const FETCH_MESSAGES: &str = "fetch_messages";

/// Smallest page the tool will request.
pub const MIN_FETCH_LIMIT: u32 = 20;
/// Largest page the tool will request.
pub const MAX_FETCH_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FetchMessagesArgs {
    #[serde(default)]
    pub limit: Option<i64>,
    /// Explicit cursor (ms); overrides the session cursor.
    #[serde(default)]
    pub before_ts: Option<i64>,
}

/// Clamp a requested page size into `[MIN_FETCH_LIMIT, MAX_FETCH_LIMIT]`.
/// Unset counts as below the floor.
pub fn effective_limit(requested: Option<i64>) -> u32 {
    requested
        .unwrap_or(0)
        .clamp(MIN_FETCH_LIMIT as i64, MAX_FETCH_LIMIT as i64) as u32
}

pub struct FetchMessagesTool {
    chat: Arc<dyn ChatClient>,
    activity: ActivityRecorder,
}

impl FetchMessagesTool {
    pub fn new(chat: Arc<dyn ChatClient>, activity: ActivityRecorder) -> Self {
        Self { chat, activity }
    }
}

#[async_trait]
impl Tool for FetchMessagesTool {
    fn name(&self) -> &str {
        FETCH_MESSAGES
    }

    fn description(&self) -> &str {
        "Fetch older messages from this conversation, newest first. Repeated \
         calls page further back in time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "How many messages to fetch (20-100)"
                },
                "before_ts": {
                    "type": "integer",
                    "description": "Only messages older than this timestamp in milliseconds"
                }
            }
        })
    }

    fn decode(&self, params: serde_json::Value) -> Result<ToolArgs, ToolError> {
        decode_args(FETCH_MESSAGES, params).map(ToolArgs::FetchMessages)
    }

    async fn execute(
        &self,
        args: ToolArgs,
        session: &mut Session,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let ToolArgs::FetchMessages(args) = args else {
            return Err(mismatched_args(FETCH_MESSAGES, &args));
        };

        let query = HistoryQuery {
            user_id: session.sender_id().to_string(),
            channel_id: session.channel_id().to_string(),
            limit: effective_limit(args.limit),
            before: args.before_ts.or(session.next_message_timestamp()),
        };

        let messages = self
            .chat
            .fetch_history(&query)
            .await
            .map_err(|source| ToolError::UpstreamFetch {
                name: FETCH_MESSAGES.into(),
                source,
            })?;

        if let Some(oldest) = messages.last() {
            session.save_next_message_timestamp(oldest.created_at);
        }

        tracing::debug!(
            session_id = %session.id(),
            limit = query.limit,
            before = ?query.before,
            count = messages.len(),
            "Fetched message page"
        );

        self.activity
            .emit(ActivityEvent::for_session(
                session,
                ActivityKind::MessagesFetched,
                serde_json::json!({
                    "limit": query.limit,
                    "before_ts": query.before,
                    "count": messages.len(),
                }),
            ))
            .await;

        Ok(ToolOutput::new(
            ToolOutcome::MessagesFetched {
                messages,
                next_before_ts: session.next_message_timestamp(),
            },
            start.elapsed(),
        ))
    }
}
