//! Tool registry for managing available tools.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::agent::activity::ActivityRecorder;
use crate::agent::session::Session;
use crate::channels::ChatClient;
use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::store::Database;
use crate::tools::builtin::{
    EndSessionTool, FetchMessagesTool, PurchaseIntentTool, ReplyMessageTool,
};
use crate::tools::tool::{Tool, ToolResponse};

/// Registry of available tools, shared by every conversation.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. Existing entries are never replaced.
    pub async fn add_tool(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidTool {
                reason: "tool name must not be empty".into(),
            });
        }

        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            return Err(ToolError::Duplicate { name });
        }
        tools.insert(name.clone(), tool);
        tracing::debug!("Registered tool: {}", name);
        Ok(())
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// All registered names, in no particular order.
    pub async fn available_tools(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.try_read().map(|t| t.len()).unwrap_or(0)
    }

    /// Snapshot the tools a mode asks for. Unknown names are logged and left out.
    pub async fn resolve(&self, names: &[String]) -> ToolSet {
        let tools = self.tools.read().await;
        let mut set = ToolSet::default();
        for name in names {
            match tools.get(name) {
                Some(tool) => set.insert(Arc::clone(tool)),
                None => tracing::warn!(tool = %name, "Mode references unregistered tool"),
            }
        }
        set
    }

    /// Look up, decode and run a tool. Every failure, including a missing
    /// tool, comes back inside the response.
    pub async fn execute_tool(
        &self,
        name: &str,
        params: serde_json::Value,
        session: &mut Session,
    ) -> ToolResponse {
        match self.get(name).await {
            Some(tool) => dispatch(tool.as_ref(), params, session).await,
            None => ToolResponse {
                tool: name.to_string(),
                result: Err(ToolError::NotFound { name: name.into() }),
            },
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The tools available to one mode, resolved once per inbound message.
#[derive(Default, Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    fn insert(&mut self, tool: Arc<dyn Tool>) {
        if self.get(tool.name()).is_none() {
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for LLM function calling, in mode order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }
}

/// Decode the payload once, then execute. A decode failure never reaches
/// the tool.
pub async fn dispatch(
    tool: &dyn Tool,
    params: serde_json::Value,
    session: &mut Session,
) -> ToolResponse {
    let name = tool.name().to_string();
    let result = match tool.decode(params) {
        Ok(args) => tool.execute(args, session).await,
        Err(e) => Err(e),
    };

    match &result {
        Ok(output) => tracing::debug!(
            tool = %name,
            session_id = %session.id(),
            elapsed_ms = output.duration.as_millis() as u64,
            "Tool succeeded"
        ),
        Err(e) => tracing::warn!(
            tool = %name,
            session_id = %session.id(),
            error = %e,
            "Tool failed"
        ),
    }

    ToolResponse { tool: name, result }
}

/// Register the five marketplace tools.
pub async fn register_builtin_tools(
    registry: &ToolRegistry,
    store: Arc<dyn Database>,
    chat: Arc<dyn ChatClient>,
    activity: ActivityRecorder,
) -> Result<(), ToolError> {
    registry
        .add_tool(Arc::new(ReplyMessageTool::new(
            Arc::clone(&chat),
            activity.clone(),
        )))
        .await?;
    registry
        .add_tool(Arc::new(FetchMessagesTool::new(
            Arc::clone(&chat),
            activity.clone(),
        )))
        .await?;
    registry
        .add_tool(Arc::new(PurchaseIntentTool::trigger_buy(
            Arc::clone(&store),
            Arc::clone(&chat),
            activity.clone(),
        )))
        .await?;
    registry
        .add_tool(Arc::new(PurchaseIntentTool::purchase_intent(
            Arc::clone(&store),
            Arc::clone(&chat),
            activity.clone(),
        )))
        .await?;
    registry
        .add_tool(Arc::new(EndSessionTool::new(activity)))
        .await?;

    tracing::info!(count = registry.count(), "Registered built-in tools");
    Ok(())
}
