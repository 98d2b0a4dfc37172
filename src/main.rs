use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use marketplace_agent::agent::{ActivityRecorder, Agent, AgentDeps, InboundMessage};
use marketplace_agent::channels::{ChatClient, ChatConfig, HttpChatClient};
use marketplace_agent::config::{AgentConfig, ModeCatalog};
use marketplace_agent::llm::{LlmConfig, create_provider};
use marketplace_agent::store::{Database, LibSqlBackend};
use marketplace_agent::tools::{ToolRegistry, register_builtin_tools};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AgentConfig::from_env().context("agent configuration")?;
    let llm_config = LlmConfig::from_env(config.call_timeout).context("LLM configuration")?;
    let chat_config =
        ChatConfig::from_env(config.call_timeout).context("chat platform configuration")?;
    let catalog = Arc::new(
        ModeCatalog::from_env(&llm_config.model, &config).context("conversation modes")?,
    );

    eprintln!("{} v{}", config.name, env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Chat API: {}", chat_config.base_url);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::env::var("MARKET_AGENT_DB_PATH")
        .unwrap_or_else(|_| "./data/market-agent.db".to_string());
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .with_context(|| format!("opening database at {db_path}"))?,
    );
    eprintln!("   Database: {}", db_path);

    // ── Collaborators ────────────────────────────────────────────────────
    let llm = create_provider(&llm_config)?;
    let chat: Arc<dyn ChatClient> = Arc::new(HttpChatClient::new(&chat_config)?);
    let activity = ActivityRecorder::new(Arc::clone(&db));

    let mut activity_rx = activity.subscribe();
    tokio::spawn(async move {
        loop {
            match activity_rx.recv().await {
                Ok(event) => tracing::debug!(
                    session_id = %event.session_id,
                    channel_id = %event.channel_id,
                    kind = %event.kind,
                    "Activity"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Activity log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── Tools ────────────────────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools, Arc::clone(&db), Arc::clone(&chat), activity).await?;
    eprintln!("   Tools: {} registered", tools.count());

    let mut modes = catalog.names();
    modes.sort();
    eprintln!("   Modes: {}", modes.join(", "));
    eprintln!("   Reading newline-delimited JSON messages from stdin.\n");

    // ── Agent ───────────────────────────────────────────────────────────
    let agent = Arc::new(Agent::new(
        config,
        AgentDeps {
            store: db,
            llm,
            chat,
            tools,
        },
    ));

    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let inbound: InboundMessage = match serde_json::from_str(line) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring malformed inbound message");
                        continue;
                    }
                };

                let agent = Arc::clone(&agent);
                let catalog = Arc::clone(&catalog);
                tasks.spawn(async move {
                    match agent.process_message_by_name(&inbound, &catalog).await {
                        Ok(outcome) => tracing::info!(
                            session_id = %inbound.session_id,
                            message_id = %inbound.message_id,
                            outcome = ?outcome,
                            "Inbound message handled"
                        ),
                        Err(e) => tracing::error!(
                            session_id = %inbound.session_id,
                            message_id = %inbound.message_id,
                            error = %e,
                            "Inbound message failed"
                        ),
                    }
                });
            }
            Ok(None) => break, // EOF
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        }

        // Reap finished conversations so the set stays small.
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                tracing::error!(error = %e, "Conversation task aborted");
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "Conversation task aborted");
        }
    }

    Ok(())
}
