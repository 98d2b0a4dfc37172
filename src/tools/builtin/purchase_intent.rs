//! Purchase intent capture.
//!
//! One implementation backs two model-facing tools: `trigger_buy` (no
//! confidence) and `purchase_intent` (with a confidence percentage).
//! Writing the intent is the guaranteed effect. The outbound notification
//! and the activity record are best-effort.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::agent::activity::{ActivityEvent, ActivityRecorder};
use crate::agent::session::Session;
use crate::channels::ChatClient;
use crate::error::ToolError;
use crate::store::{ActivityKind, Database, NewPurchaseIntent};
use crate::tools::tool::{
    Tool, ToolArgs, ToolOutcome, ToolOutput, decode_args, mismatched_args,
};

pub const TRIGGER_BUY: &str = "trigger_buy";
pub const PURCHASE_INTENT: &str = "purchase_intent";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PurchaseIntentArgs {
    pub item_name: String,
    /// Free text; models sometimes send a bare number.
    #[serde(deserialize_with = "string_or_number")]
    pub item_price: String,
    pub intent: String,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Price::deserialize(deserializer)? {
        Price::Text(s) => s,
        Price::Number(n) => n.to_string(),
    })
}

/// Clamp a confidence percentage into `[0, 100]`. NaN is dropped.
pub fn clamp_percentage(p: f64) -> Option<f64> {
    if p.is_nan() {
        None
    } else {
        Some(p.clamp(0.0, 100.0))
    }
}

pub struct PurchaseIntentTool {
    name: &'static str,
    with_confidence: bool,
    store: Arc<dyn Database>,
    chat: Arc<dyn ChatClient>,
    activity: ActivityRecorder,
}

impl PurchaseIntentTool {
    /// Basic variant: records the intent without a confidence value.
    pub fn trigger_buy(
        store: Arc<dyn Database>,
        chat: Arc<dyn ChatClient>,
        activity: ActivityRecorder,
    ) -> Self {
        Self {
            name: TRIGGER_BUY,
            with_confidence: false,
            store,
            chat,
            activity,
        }
    }

    /// Richer variant: accepts `percentage` as the intent confidence.
    pub fn purchase_intent(
        store: Arc<dyn Database>,
        chat: Arc<dyn ChatClient>,
        activity: ActivityRecorder,
    ) -> Self {
        Self {
            name: PURCHASE_INTENT,
            with_confidence: true,
            store,
            chat,
            activity,
        }
    }
}

#[async_trait]
impl Tool for PurchaseIntentTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        if self.with_confidence {
            "Record that the buyer intends to purchase an item, with how confident \
             you are (0-100). Optionally send them a message afterwards."
        } else {
            "Record that the buyer wants to buy an item. Optionally send them a \
             message afterwards."
        }
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let mut schema = serde_json::json!({
            "type": "object",
            "properties": {
                "item_name": {
                    "type": "string",
                    "description": "Name of the item"
                },
                "item_price": {
                    "type": "string",
                    "description": "Price as discussed, free text"
                },
                "intent": {
                    "type": "string",
                    "description": "What the buyer said or wants"
                },
                "message": {
                    "type": "string",
                    "description": "Optional message to send after recording"
                }
            },
            "required": ["item_name", "item_price", "intent"]
        });
        if self.with_confidence {
            schema["properties"]["percentage"] = serde_json::json!({
                "type": "number",
                "description": "Confidence that the buyer will complete the purchase, 0-100"
            });
        }
        schema
    }

    fn decode(&self, params: serde_json::Value) -> Result<ToolArgs, ToolError> {
        decode_args(self.name, params).map(ToolArgs::PurchaseIntent)
    }

    async fn execute(
        &self,
        args: ToolArgs,
        session: &mut Session,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let ToolArgs::PurchaseIntent(args) = args else {
            return Err(mismatched_args(self.name, &args));
        };

        let confidence = if self.with_confidence {
            args.percentage.and_then(clamp_percentage)
        } else {
            None
        };

        let intent = NewPurchaseIntent {
            session_id: session.id(),
            channel_id: session.channel_id().to_string(),
            user_id: session.counterpart_id().to_string(),
            item_name: args.item_name,
            item_price: args.item_price,
            intent: args.intent,
            confidence,
        };

        let intent_id = self
            .store
            .create_purchase_intent(&intent)
            .await
            .map_err(|source| ToolError::Persistence {
                name: self.name.into(),
                source,
            })?;

        tracing::info!(
            session_id = %session.id(),
            intent_id = %intent_id,
            item = %intent.item_name,
            confidence = ?intent.confidence,
            "Purchase intent recorded"
        );

        let mut notified = false;
        if let Some(message) = args.message.as_deref().filter(|m| !m.trim().is_empty()) {
            match self
                .chat
                .send_message(session.channel_id(), session.sender_id(), message)
                .await
            {
                Ok(()) => notified = true,
                Err(e) => tracing::warn!(
                    session_id = %session.id(),
                    intent_id = %intent_id,
                    error = %e,
                    "Purchase intent notification failed"
                ),
            }
        }

        self.activity
            .emit(ActivityEvent::for_session(
                session,
                ActivityKind::PurchaseIntent,
                serde_json::json!({
                    "intent_id": intent_id,
                    "item_name": intent.item_name,
                    "item_price": intent.item_price,
                    "intent": intent.intent,
                    "confidence": intent.confidence,
                    "notified": notified,
                }),
            ))
            .await;

        Ok(ToolOutput::new(
            ToolOutcome::IntentRecorded {
                intent_id,
                notified,
            },
            start.elapsed(),
        ))
    }
}
