//! Reply tool: sends the agent's answer into the conversation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agent::activity::{ActivityEvent, ActivityRecorder};
use crate::agent::session::Session;
use crate::channels::ChatClient;
use crate::error::ToolError;
use crate::store::ActivityKind;
use crate::tools::tool::{
    Tool, ToolArgs, ToolOutcome, ToolOutput, decode_args, mismatched_args,
};

pub const REPLY_MESSAGE: &str = "reply_message";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplyMessageArgs {
    pub message: String,
}

/// Sends text from the session's sender identity to its channel.
pub struct ReplyMessageTool {
    chat: Arc<dyn ChatClient>,
    activity: ActivityRecorder,
}

impl ReplyMessageTool {
    pub fn new(chat: Arc<dyn ChatClient>, activity: ActivityRecorder) -> Self {
        Self { chat, activity }
    }
}

#[async_trait]
impl Tool for ReplyMessageTool {
    fn name(&self) -> &str {
        REPLY_MESSAGE
    }

    fn description(&self) -> &str {
        "Send a chat message to the other party in this conversation. \
         This is the only way your words reach them."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message text to send"
                }
            },
            "required": ["message"]
        })
    }

    fn decode(&self, params: serde_json::Value) -> Result<ToolArgs, ToolError> {
        decode_args(REPLY_MESSAGE, params).map(ToolArgs::ReplyMessage)
    }

    async fn execute(
        &self,
        args: ToolArgs,
        session: &mut Session,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let ToolArgs::ReplyMessage(args) = args else {
            return Err(mismatched_args(REPLY_MESSAGE, &args));
        };
        if args.message.trim().is_empty() {
            return Err(ToolError::InvalidParameters {
                name: REPLY_MESSAGE.into(),
                reason: "message must not be empty".into(),
            });
        }

        self.chat
            .send_message(session.channel_id(), session.sender_id(), &args.message)
            .await
            .map_err(|source| ToolError::Send {
                name: REPLY_MESSAGE.into(),
                source,
            })?;

        self.activity
            .emit(ActivityEvent::for_session(
                session,
                ActivityKind::MessageSent,
                serde_json::json!({ "message": args.message }),
            ))
            .await;

        Ok(ToolOutput::new(
            ToolOutcome::MessageSent {
                channel_id: session.channel_id().to_string(),
                message: args.message,
            },
            start.elapsed(),
        ))
    }
}
