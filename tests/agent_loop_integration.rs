//! End-to-end tests for the agent loop.
//!
//! Each test wires a real `ToolRegistry` and an in-memory `LibSqlBackend`
//! behind a scripted model and a stub chat platform, then drives
//! `Agent::process_message` through the public API.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use uuid::Uuid;

use marketplace_agent::agent::{
    ActivityRecorder, Agent, AgentDeps, InboundMessage, LoopOutcome, StopReason,
};
use marketplace_agent::channels::{ChannelInfo, ChannelMessage, ChatClient, HistoryQuery};
use marketplace_agent::config::{AgentConfig, ModeCatalog};
use marketplace_agent::error::{ChannelError, Error, LlmError};
use marketplace_agent::llm::{
    FinishReason, LlmProvider, Role, ToolCall, ToolCompletionRequest, ToolCompletionResponse,
};
use marketplace_agent::store::{ActivityKind, Database, LibSqlBackend};
use marketplace_agent::tools::{ToolRegistry, register_builtin_tools};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Stub LLM: plays back one scripted turn per call.
#[derive(Default)]
struct StubLlm {
    turns: Mutex<VecDeque<Result<ToolCompletionResponse, LlmError>>>,
    requests: Mutex<Vec<ToolCompletionRequest>>,
}

impl StubLlm {
    fn new(turns: Vec<Result<ToolCompletionResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::default(),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn turn(
    text: Option<&str>,
    calls: &[(&str, serde_json::Value)],
) -> Result<ToolCompletionResponse, LlmError> {
    Ok(ToolCompletionResponse {
        content: text.map(str::to_string),
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("toolu_{i}"),
                name: name.to_string(),
                arguments: arguments.clone(),
            })
            .collect(),
        input_tokens: 0,
        output_tokens: 0,
        finish_reason: if calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolUse
        },
    })
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| turn(None, &[]))
    }
}

/// Stub chat platform with a fixed history per channel.
#[derive(Default)]
struct StubChat {
    history: Mutex<Vec<ChannelMessage>>,
    sent: Mutex<Vec<(String, String, String)>>,
    queries: Mutex<Vec<HistoryQuery>>,
}

#[async_trait]
impl ChatClient for StubChat {
    async fn send_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.into(), sender_id.into(), text.into()));
        Ok(())
    }

    async fn fetch_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        self.queries.lock().unwrap().push(query.clone());
        let mut page: Vec<ChannelMessage> = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id == query.channel_id)
            .filter(|m| query.before.is_none_or(|b| m.created_at < b))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        page.truncate(query.limit as usize);
        Ok(page)
    }

    async fn get_channel_info(&self, channel_id: &str) -> Result<ChannelInfo, ChannelError> {
        Ok(ChannelInfo {
            channel_id: channel_id.to_string(),
            participants: vec!["seller".into(), "buyer".into()],
            metadata: serde_json::json!({"item_name": "Road bike", "item_price": "200"}),
        })
    }
}

struct Fixture {
    agent: Agent,
    llm: Arc<StubLlm>,
    chat: Arc<StubChat>,
    db: Arc<LibSqlBackend>,
}

async fn fixture(turns: Vec<Result<ToolCompletionResponse, LlmError>>) -> Fixture {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let llm = StubLlm::new(turns);
    let chat = Arc::new(StubChat::default());

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(
        &tools,
        db.clone(),
        chat.clone(),
        ActivityRecorder::new(db.clone()),
    )
    .await
    .unwrap();

    let config = AgentConfig {
        history_limit: 0,
        ..AgentConfig::default()
    };
    let agent = Agent::new(
        config,
        AgentDeps {
            store: db.clone(),
            llm: llm.clone(),
            chat: chat.clone(),
            tools,
        },
    );
    Fixture {
        agent,
        llm,
        chat,
        db,
    }
}

fn inbound(session_id: Uuid, mode: &str) -> InboundMessage {
    InboundMessage {
        session_id: session_id.to_string(),
        channel_id: "ch-42".into(),
        message_id: "msg-100".into(),
        author_id: "buyer".into(),
        recipient_id: "seller".into(),
        text: "I'll take it for 200, can I pick up Saturday?".into(),
        mode: mode.into(),
        created_at: 100_000,
    }
}

fn history_message(id: &str, created_at: i64) -> ChannelMessage {
    ChannelMessage {
        id: id.into(),
        channel_id: "ch-42".into(),
        sender_id: "buyer".into(),
        text: format!("older {id}"),
        created_at,
    }
}

#[tokio::test]
async fn buyer_conversation_records_intent_and_ends() {
    let f = fixture(vec![
        turn(
            Some("The buyer wants it."),
            &[
                ("reply_message", serde_json::json!({"message": "Deal! Saturday works."})),
                (
                    "trigger_buy",
                    serde_json::json!({
                        "item_name": "Road bike",
                        "item_price": 200,
                        "intent": "pick up Saturday"
                    }),
                ),
            ],
        ),
        turn(None, &[("end_session", serde_json::json!({"reason": "sold"}))]),
        turn(Some("never requested"), &[]),
    ])
    .await;
    let session_id = Uuid::new_v4();
    let catalog = ModeCatalog::builtin("stub-model", 5);

    let outcome = timeout(
        TEST_TIMEOUT,
        f.agent
            .process_message_by_name(&inbound(session_id, "buyer_assist"), &catalog),
    )
    .await
    .expect("timed out")
    .unwrap();

    assert_eq!(
        outcome,
        LoopOutcome::Completed {
            generations: 2,
            stop: StopReason::SessionEnded
        }
    );
    assert_eq!(f.llm.calls(), 2);

    let system = f.llm.requests.lock().unwrap()[0].messages[0].clone();
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("Road bike"));

    let sent = f.chat.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![(
            "ch-42".to_string(),
            "seller".to_string(),
            "Deal! Saturday works.".to_string()
        )]
    );

    let intents = f.db.list_purchase_intents(session_id).await.unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].intent.user_id, "buyer");
    assert_eq!(intents[0].intent.item_price, "200");
    assert_eq!(intents[0].intent.confidence, None);

    assert!(f.db.is_session_ended(session_id).await.unwrap());

    let kinds: Vec<ActivityKind> = f
        .db
        .list_activities(session_id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ActivityKind::MessageSent,
            ActivityKind::PurchaseIntent,
            ActivityKind::SessionEnded
        ]
    );
}

#[tokio::test]
async fn seller_mode_records_confidence() {
    let f = fixture(vec![turn(
        None,
        &[(
            "purchase_intent",
            serde_json::json!({
                "item_name": "Road bike",
                "item_price": "$180 obo",
                "intent": "negotiating",
                "percentage": 65.5
            }),
        )],
    )])
    .await;
    let session_id = Uuid::new_v4();
    let catalog = ModeCatalog::builtin("stub-model", 5);

    let outcome = f
        .agent
        .process_message_by_name(&inbound(session_id, "seller_assist"), &catalog)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        LoopOutcome::Completed {
            generations: 2,
            stop: StopReason::NoToolCalls
        }
    );
    let intents = f.db.list_purchase_intents(session_id).await.unwrap();
    assert_eq!(intents[0].intent.confidence, Some(65.5));
    assert!(!f.db.is_session_ended(session_id).await.unwrap());
}

#[tokio::test]
async fn pagination_walks_back_through_history() {
    let f = fixture(vec![
        turn(None, &[("fetch_messages", serde_json::json!({"limit": 20}))]),
        turn(None, &[("fetch_messages", serde_json::json!({"limit": 20}))]),
    ])
    .await;
    {
        let mut history = f.chat.history.lock().unwrap();
        for i in 0..30 {
            history.push(history_message(&format!("h{i}"), 1_000 + i * 10));
        }
    }
    let session_id = Uuid::new_v4();
    let catalog = ModeCatalog::builtin("stub-model", 5);

    f.agent
        .process_message_by_name(&inbound(session_id, "buyer_assist"), &catalog)
        .await
        .unwrap();

    let queries = f.chat.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].before, None);
    // Oldest of the newest twenty is h10 at 1_100.
    assert_eq!(queries[1].before, Some(1_100));
    assert_eq!(queries[1].user_id, "seller");

    let requests = f.llm.requests.lock().unwrap();
    let tool_turn = requests[2]
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    let envelope: serde_json::Value =
        serde_json::from_str(&tool_turn.tool_results[0].content).unwrap();
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["result"]["kind"], "messages_fetched");
    assert_eq!(envelope["result"]["messages"].as_array().unwrap().len(), 10);
    assert_eq!(envelope["result"]["next_before_ts"], 1_000);
}

#[tokio::test]
async fn concurrent_conversations_keep_separate_sessions() {
    let f = fixture(vec![
        turn(None, &[("end_session", serde_json::json!({}))]),
        turn(None, &[("reply_message", serde_json::json!({"message": "hello"}))]),
    ])
    .await;
    let catalog = ModeCatalog::builtin("stub-model", 5);
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let m1 = inbound(first, "buyer_assist");
    let m2 = inbound(second, "buyer_assist");

    let (a, b) = tokio::join!(
        f.agent.process_message_by_name(&m1, &catalog),
        f.agent.process_message_by_name(&m2, &catalog),
    );
    a.unwrap();
    b.unwrap();

    let ended = [
        f.db.is_session_ended(first).await.unwrap(),
        f.db.is_session_ended(second).await.unwrap(),
    ];
    assert_eq!(ended.iter().filter(|e| **e).count(), 1);
}

#[tokio::test]
async fn model_failure_aborts_without_reply() {
    let f = fixture(vec![Err(LlmError::RequestFailed {
        provider: "stub".into(),
        reason: "overloaded".into(),
    })])
    .await;
    let catalog = ModeCatalog::builtin("stub-model", 5);

    let err = f
        .agent
        .process_message_by_name(&inbound(Uuid::new_v4(), "buyer_assist"), &catalog)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Llm(_)));
    assert!(f.chat.sent.lock().unwrap().is_empty());
}
