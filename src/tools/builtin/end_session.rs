//! `end_session`: closes the conversation so the agent loop stops.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agent::activity::{ActivityEvent, ActivityRecorder};
use crate::agent::session::Session;
use crate::error::ToolError;
use crate::store::ActivityKind;
use crate::tools::tool::{
    Tool, ToolArgs, ToolOutcome, ToolOutput, decode_args, mismatched_args,
};

pub const END_SESSION: &str = "end_session";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EndSessionArgs {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Ends the conversation. The agent loop stops after the current batch.
pub struct EndSessionTool {
    activity: ActivityRecorder,
}

impl EndSessionTool {
    pub fn new(activity: ActivityRecorder) -> Self {
        Self { activity }
    }
}

#[async_trait]
impl Tool for EndSessionTool {
    fn name(&self) -> &str {
        END_SESSION
    }

    fn description(&self) -> &str {
        "End this conversation. Use when the deal is done, the item is gone, \
         or the other party has stopped engaging."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "Why the conversation is ending"
                }
            }
        })
    }

    fn decode(&self, params: serde_json::Value) -> Result<ToolArgs, ToolError> {
        decode_args(END_SESSION, params).map(ToolArgs::EndSession)
    }

    async fn execute(
        &self,
        args: ToolArgs,
        session: &mut Session,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let ToolArgs::EndSession(args) = args else {
            return Err(mismatched_args(END_SESSION, &args));
        };

        let ended_now = session
            .end()
            .await
            .map_err(|source| ToolError::Persistence {
                name: END_SESSION.into(),
                source,
            })?;

        if ended_now {
            self.activity
                .emit(ActivityEvent::for_session(
                    session,
                    ActivityKind::SessionEnded,
                    serde_json::json!({ "reason": args.reason }),
                ))
                .await;
        }

        Ok(ToolOutput::new(
            ToolOutcome::SessionEnded {
                reason: args.reason,
            },
            start.elapsed(),
        ))
    }
}
