//! Tool trait and the typed values that cross the model boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::agent::session::Session;
use crate::channels::ChannelMessage;
use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::tools::builtin::{
    EndSessionArgs, FetchMessagesArgs, PurchaseIntentArgs, ReplyMessageArgs,
};

/// Decoded arguments, one variant per built-in tool kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    ReplyMessage(ReplyMessageArgs),
    FetchMessages(FetchMessagesArgs),
    PurchaseIntent(PurchaseIntentArgs),
    EndSession(EndSessionArgs),
}

/// What a tool achieved, serialized into the envelope's `result`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOutcome {
    MessageSent {
        channel_id: String,
        message: String,
    },
    MessagesFetched {
        messages: Vec<ChannelMessage>,
        /// Cursor the next fetch will page back from.
        next_before_ts: Option<i64>,
    },
    IntentRecorded {
        intent_id: Uuid,
        /// Whether the optional outbound message went out.
        notified: bool,
    },
    SessionEnded {
        reason: Option<String>,
    },
}

/// Output from a successful tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub outcome: ToolOutcome,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn new(outcome: ToolOutcome, duration: Duration) -> Self {
        Self { outcome, duration }
    }
}

/// Result of one dispatched tool call. Never an `Err` at the call site:
/// failures live inside `result` so callers can keep going.
#[derive(Debug)]
pub struct ToolResponse {
    pub tool: String,
    pub result: Result<ToolOutput, ToolError>,
}

impl ToolResponse {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Uniform `{success, result|error}` envelope.
    pub fn envelope(&self) -> serde_json::Value {
        match &self.result {
            Ok(output) => serde_json::json!({
                "success": true,
                "result": output.outcome,
            }),
            Err(e) => serde_json::json!({
                "success": false,
                "error": e.to_string(),
            }),
        }
    }
}

/// A named capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Also the model-facing capability description.
    fn description(&self) -> &str;

    /// JSON schema for the arguments, as shown to the model.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Decode the model's untyped payload into this tool's arguments.
    fn decode(&self, params: serde_json::Value) -> Result<ToolArgs, ToolError>;

    async fn execute(&self, args: ToolArgs, session: &mut Session)
    -> Result<ToolOutput, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Structured decode of a tool payload. `null` is treated as `{}`.
pub fn decode_args<T: DeserializeOwned>(
    tool: &str,
    params: serde_json::Value,
) -> Result<T, ToolError> {
    let params = if params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParameters {
        name: tool.to_string(),
        reason: e.to_string(),
    })
}

/// Error for arguments decoded by a different tool kind.
pub(crate) fn mismatched_args(tool: &str, args: &ToolArgs) -> ToolError {
    ToolError::InvalidParameters {
        name: tool.to_string(),
        reason: format!("unexpected argument kind {args:?}"),
    }
}
