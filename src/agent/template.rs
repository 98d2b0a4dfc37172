//! Prompt and predicate rendering.
//!
//! Templates see four values: `message` (the inbound message), `channel`
//! (platform info, `metadata` always an object), `session` (identity and
//! cursor) and `mode` (the mode name).

use minijinja::{Environment, UndefinedBehavior, Value, context};

use crate::agent::agent_loop::InboundMessage;
use crate::agent::session::Session;
use crate::channels::ChannelInfo;
use crate::error::AgentError;

/// Values exposed to mode templates.
pub struct PromptContext {
    value: Value,
}

impl PromptContext {
    pub fn new(
        message: &InboundMessage,
        channel: &ChannelInfo,
        session: &Session,
        mode: &str,
    ) -> Self {
        let mut channel = channel.clone();
        if !channel.metadata.is_object() {
            channel.metadata = serde_json::json!({});
        }

        let value = context! {
            message => Value::from_serialize(message),
            channel => Value::from_serialize(&channel),
            session => context! {
                id => session.id().to_string(),
                channel_id => session.channel_id(),
                sender_id => session.sender_id(),
                counterpart_id => session.counterpart_id(),
                next_before_ts => session.next_message_timestamp(),
            },
            mode => mode,
        };
        Self { value }
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env
}

/// Render a mode's system prompt.
pub fn render_prompt(
    name: &str,
    template: &str,
    ctx: &PromptContext,
) -> Result<String, AgentError> {
    environment()
        .render_str(template, &ctx.value)
        .map_err(|e| AgentError::Template {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// Evaluate a `when` predicate. Truthy output is `true`, `1` or `yes`
/// (trimmed, any case); anything else, including empty, is false.
pub fn evaluate_when(
    name: &str,
    predicate: &str,
    ctx: &PromptContext,
) -> Result<bool, AgentError> {
    let rendered = render_prompt(name, predicate, ctx)?;
    let rendered = rendered.trim().to_ascii_lowercase();
    Ok(matches!(rendered.as_str(), "true" | "1" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, test_session};

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            session_id: uuid::Uuid::new_v4().to_string(),
            channel_id: "ch-1".into(),
            message_id: "m-9".into(),
            author_id: "buyer-1".into(),
            recipient_id: "seller-1".into(),
            text: text.into(),
            mode: "buyer_assist".into(),
            created_at: 9_000,
        }
    }

    fn ctx(metadata: serde_json::Value) -> PromptContext {
        let channel = ChannelInfo {
            channel_id: "ch-1".into(),
            participants: vec![],
            metadata,
        };
        let session = test_session(MemoryStore::new());
        PromptContext::new(&inbound("is it available?"), &channel, &session, "buyer_assist")
    }

    #[test]
    fn renders_listing_fields() {
        let out = render_prompt(
            "buyer_assist",
            "Item: {{ channel.metadata.item_name }} / {{ message.text }} / {{ mode }}",
            &ctx(serde_json::json!({"item_name": "Road bike"})),
        )
        .unwrap();
        assert_eq!(out, "Item: Road bike / is it available? / buyer_assist");
    }

    #[test]
    fn null_metadata_still_supports_defaults() {
        let out = render_prompt(
            "p",
            "{{ channel.metadata.item_name | default('unknown item') }}",
            &ctx(serde_json::Value::Null),
        )
        .unwrap();
        assert_eq!(out, "unknown item");
    }

    #[test]
    fn builtin_prompts_render() {
        let c = ctx(serde_json::json!({"item_name": "Lamp", "item_price": "15"}));
        let buyer = render_prompt("buyer", crate::config::DEFAULT_BUYER_PROMPT, &c).unwrap();
        assert!(buyer.contains("Lamp"));
        assert!(buyer.contains("asking price: 15"));
        let seller = render_prompt("seller", crate::config::DEFAULT_SELLER_PROMPT, &c).unwrap();
        assert!(seller.contains("Lamp"));
    }

    #[test]
    fn predicate_truthiness() {
        let c = ctx(serde_json::json!({"status": "active"}));
        assert!(evaluate_when("w", "{{ channel.metadata.status == 'active' }}", &c).unwrap());
        assert!(evaluate_when("w", "  YES ", &c).unwrap());
        assert!(evaluate_when("w", "1", &c).unwrap());
        assert!(!evaluate_when("w", "{{ channel.metadata.status == 'sold' }}", &c).unwrap());
        assert!(!evaluate_when("w", "", &c).unwrap());
        assert!(!evaluate_when("w", "maybe", &c).unwrap());
    }

    #[test]
    fn syntax_error_is_template_error() {
        let err = evaluate_when("w", "{{ oops", &ctx(serde_json::json!({}))).unwrap_err();
        assert!(matches!(err, AgentError::Template { ref name, .. } if name == "w"));
    }
}
