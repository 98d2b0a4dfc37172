//! Reasoning layer: the single generation call the agent loop makes.
//!
//! Wraps an `LlmProvider`: messages + model name + tool specs in, text
//! and/or ordered tool-invocation requests out. No retries.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{ChatMessage, LlmProvider, ToolCall, ToolCompletionRequest, ToolDefinition};

/// Token usage from an LLM call.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Output of one generation call.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// Text the model produced, if any (never `Some("")`).
    pub text: Option<String>,
    /// Tool invocations, in the order the model returned them.
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Reasoning layer that wraps an LLM provider.
pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    max_tokens: Option<u32>,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Run one generation over the full history with the given tools.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tools: &[ToolDefinition],
    ) -> Result<Generation, LlmError> {
        let mut request =
            ToolCompletionRequest::new(messages.to_vec(), tools.to_vec()).with_model(model);
        request.max_tokens = self.max_tokens;

        let response = self.llm.complete_with_tools(request).await?;

        Ok(Generation {
            text: response.content.filter(|t| !t.trim().is_empty()),
            tool_calls: response.tool_calls,
            usage: TokenUsage {
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
            },
        })
    }
}
