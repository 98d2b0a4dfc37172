//! Main agent loop.
//!
//! One call to [`Agent::process_message`] handles one inbound chat message:
//! it builds a fresh [`Session`], renders the mode's prompt, and runs the
//! bounded generate → execute cycle until the model stops asking for
//! tools, a tool ends the session, or the iteration budget runs out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::session::Session;
use crate::agent::template::{PromptContext, evaluate_when, render_prompt};
use crate::channels::{ChannelInfo, ChatClient, HistoryQuery};
use crate::config::{AgentConfig, ModeCatalog, ModeConfig};
use crate::error::{AgentError, ChannelError, Error, LlmError};
use crate::llm::{
    ChatMessage, Generation, LlmProvider, Reasoning, ToolCall, ToolDefinition, ToolResultPart,
};
use crate::store::Database;
use crate::tools::registry::{ToolRegistry, ToolSet, dispatch};

/// Collapse a tool output string into a single-line preview for logging.
pub fn truncate_for_preview(output: &str, max_chars: usize) -> String {
    let collapsed: String = output
        .chars()
        .take(max_chars + 50)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.chars().count() > max_chars {
        let byte_offset = collapsed
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(collapsed.len());
        format!("{}...", &collapsed[..byte_offset])
    } else {
        collapsed
    }
}

/// A chat message addressed to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Conversation id; must be a UUID.
    pub session_id: String,
    pub channel_id: String,
    pub message_id: String,
    /// The other party, who wrote this message.
    pub author_id: String,
    /// The identity the agent answers as.
    pub recipient_id: String,
    pub text: String,
    /// Name of the mode in the `ModeCatalog`.
    pub mode: String,
    /// Milliseconds since epoch.
    #[serde(default)]
    pub created_at: i64,
}

/// Why a completed loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting tools.
    NoToolCalls,
    /// A tool ended the session.
    SessionEnded,
    /// `max_iterations` generations ran without either of the above.
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The mode's `when` predicate was false; nothing ran.
    Skipped,
    Completed { generations: usize, stop: StopReason },
}

/// Core dependencies for the agent.
///
/// Bundles the shared components to reduce argument count.
pub struct AgentDeps {
    pub store: Arc<dyn Database>,
    pub llm: Arc<dyn LlmProvider>,
    pub chat: Arc<dyn ChatClient>,
    pub tools: Arc<ToolRegistry>,
}

/// Coordinates the model, the tools and per-message sessions.
///
/// Holds no per-conversation state, so one `Agent` can serve any number of
/// concurrent `process_message` calls.
pub struct Agent {
    config: AgentConfig,
    deps: AgentDeps,
    reasoning: Reasoning,
}

impl Agent {
    pub fn new(config: AgentConfig, deps: AgentDeps) -> Self {
        let mut reasoning = Reasoning::new(Arc::clone(&deps.llm));
        if let Some(max_tokens) = config.max_tokens {
            reasoning = reasoning.with_max_tokens(max_tokens);
        }
        Self {
            config,
            deps,
            reasoning,
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.deps.tools
    }

    /// Look up `inbound.mode` in the catalog, then process.
    pub async fn process_message_by_name(
        &self,
        inbound: &InboundMessage,
        catalog: &ModeCatalog,
    ) -> Result<LoopOutcome, Error> {
        let mode = catalog.get(&inbound.mode)?;
        self.process_message(inbound, mode).await
    }

    /// Handle one inbound message under `mode`.
    ///
    /// Fatal: malformed session id, channel lookup failure, template
    /// failure, model generation failure. Tool failures are reported to
    /// the model and never end the call.
    pub async fn process_message(
        &self,
        inbound: &InboundMessage,
        mode: &ModeConfig,
    ) -> Result<LoopOutcome, Error> {
        let session_id =
            Uuid::parse_str(&inbound.session_id).map_err(|e| AgentError::InvalidSessionId {
                value: inbound.session_id.clone(),
                reason: e.to_string(),
            })?;

        let mut session = Session::new(
            session_id,
            &inbound.channel_id,
            &inbound.recipient_id,
            &inbound.author_id,
            Arc::clone(&self.deps.store),
        );

        let channel = self.channel_info(&inbound.channel_id).await?;

        let system_prompt = {
            let ctx = PromptContext::new(inbound, &channel, &session, &mode.name);
            if let Some(when) = mode.when.as_deref()
                && !evaluate_when(&format!("{}.when", mode.name), when, &ctx)?
            {
                tracing::info!(
                    session_id = %session_id,
                    mode = %mode.name,
                    "Predicate false, skipping message"
                );
                return Ok(LoopOutcome::Skipped);
            }
            render_prompt(&mode.name, &mode.prompt_template, &ctx)?
        };

        let tools = self.deps.tools.resolve(&mode.tools).await;
        if tools.is_empty() {
            tracing::warn!(mode = %mode.name, "Mode offers no registered tools");
        }
        let definitions = tools.definitions();

        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(self.recent_history(inbound, &session).await);
        messages.push(ChatMessage::user(inbound.text.clone()));

        tracing::info!(
            agent = %self.config.name,
            session_id = %session_id,
            channel_id = %inbound.channel_id,
            mode = %mode.name,
            tools = ?tools.names(),
            context_messages = messages.len(),
            "Processing inbound message"
        );

        let outcome = self
            .run_loop(&mut session, messages, &tools, &definitions, mode)
            .await?;

        tracing::info!(session_id = %session_id, outcome = ?outcome, "Message processed");
        Ok(outcome)
    }

    async fn run_loop(
        &self,
        session: &mut Session,
        mut messages: Vec<ChatMessage>,
        tools: &ToolSet,
        definitions: &[ToolDefinition],
        mode: &ModeConfig,
    ) -> Result<LoopOutcome, Error> {
        let mut generations = 0;

        for iteration in 0..mode.max_iterations {
            let generation = self.generate(&messages, &mode.model, definitions).await?;
            generations += 1;

            tracing::debug!(
                session_id = %session.id(),
                iteration,
                tool_calls = generation.tool_calls.len(),
                tokens = generation.usage.total(),
                "Generation complete"
            );

            if generation.tool_calls.is_empty() {
                if let Some(text) = generation.text {
                    messages.push(ChatMessage::assistant(text));
                }
                return Ok(LoopOutcome::Completed {
                    generations,
                    stop: StopReason::NoToolCalls,
                });
            }

            messages.push(ChatMessage::assistant_with_tool_calls(
                generation.text,
                generation.tool_calls.clone(),
            ));

            let parts = self
                .execute_tool_calls(&generation.tool_calls, tools, session, iteration)
                .await;
            if !parts.is_empty() {
                messages.push(ChatMessage::tool_results(parts));
            }

            if session.is_ended() {
                return Ok(LoopOutcome::Completed {
                    generations,
                    stop: StopReason::SessionEnded,
                });
            }
        }

        tracing::info!(
            session_id = %session.id(),
            max_iterations = mode.max_iterations,
            "Iteration budget exhausted"
        );
        Ok(LoopOutcome::Completed {
            generations,
            stop: StopReason::BudgetExhausted,
        })
    }

    /// Run the requested tools one at a time, in the model's order.
    ///
    /// Unknown names and panicking tools produce no result part.
    async fn execute_tool_calls(
        &self,
        calls: &[ToolCall],
        tools: &ToolSet,
        session: &mut Session,
        iteration: usize,
    ) -> Vec<ToolResultPart> {
        let mut parts = Vec::with_capacity(calls.len());

        for call in calls {
            let Some(tool) = tools.get(&call.name) else {
                tracing::warn!(
                    session_id = %session.id(),
                    tool = %call.name,
                    iteration,
                    "Model requested a tool not available in this mode, skipping"
                );
                continue;
            };

            let run = dispatch(tool.as_ref(), call.arguments.clone(), session);
            let response = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    tracing::error!(
                        session_id = %session.id(),
                        tool = %call.name,
                        iteration,
                        panic = %panic_message(panic.as_ref()),
                        "Tool panicked, skipping"
                    );
                    continue;
                }
            };

            let content = response.envelope().to_string();
            tracing::debug!(
                session_id = %session.id(),
                tool = %response.tool,
                iteration,
                result = %truncate_for_preview(&content, 200),
                "Tool result"
            );

            parts.push(ToolResultPart {
                tool_call_id: call.id.clone(),
                name: response.tool.clone(),
                is_error: !response.is_success(),
                content,
            });
        }

        parts
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        model: &str,
        tools: &[ToolDefinition],
    ) -> Result<Generation, LlmError> {
        tokio::time::timeout(
            self.config.call_timeout,
            self.reasoning.generate(messages, model, tools),
        )
        .await
        .unwrap_or_else(|_| {
            Err(LlmError::RequestFailed {
                provider: self.deps.llm.model_name().to_string(),
                reason: format!("timed out after {:?}", self.config.call_timeout),
            })
        })
    }

    async fn channel_info(&self, channel_id: &str) -> Result<ChannelInfo, ChannelError> {
        tokio::time::timeout(
            self.config.call_timeout,
            self.deps.chat.get_channel_info(channel_id),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ChannelError::InfoFailed {
                channel: channel_id.to_string(),
                reason: format!("timed out after {:?}", self.config.call_timeout),
            })
        })
    }

    /// Most recent channel messages as chronological turns, without the
    /// inbound message itself. Failures leave the context empty.
    async fn recent_history(
        &self,
        inbound: &InboundMessage,
        session: &Session,
    ) -> Vec<ChatMessage> {
        if self.config.history_limit == 0 {
            return Vec::new();
        }

        let query = HistoryQuery {
            user_id: session.sender_id().to_string(),
            channel_id: session.channel_id().to_string(),
            limit: self.config.history_limit,
            before: None,
        };

        let page = match tokio::time::timeout(
            self.config.call_timeout,
            self.deps.chat.fetch_history(&query),
        )
        .await
        {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %e,
                    "History prefetch failed, continuing without context"
                );
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %session.id(),
                    "History prefetch timed out, continuing without context"
                );
                return Vec::new();
            }
        };

        page.into_iter()
            .rev()
            .filter(|m| m.id != inbound.message_id && !m.text.trim().is_empty())
            .map(|m| {
                if m.sender_id == session.sender_id() {
                    ChatMessage::assistant(m.text)
                } else {
                    ChatMessage::user(m.text)
                }
            })
            .collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
