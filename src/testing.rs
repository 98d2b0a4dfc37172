//! In-crate stub collaborators for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::agent::session::Session;
use crate::channels::{ChannelInfo, ChannelMessage, ChatClient, HistoryQuery};
use crate::error::{ChannelError, DatabaseError, LlmError};
use crate::llm::{
    FinishReason, LlmProvider, ToolCall, ToolCompletionRequest, ToolCompletionResponse,
};
use crate::store::{
    ActivityKind, ActivityRecord, Database, NewPurchaseIntent, PurchaseIntentRecord,
};

/// Session on channel `ch-1`, acting as `seller-1`, talking to `buyer-1`.
pub fn test_session(store: Arc<dyn Database>) -> Session {
    Session::new(Uuid::new_v4(), "ch-1", "seller-1", "buyer-1", store)
}

/// A message from `buyer-1` on `ch-1`.
pub fn message_at(id: &str, created_at: i64) -> ChannelMessage {
    ChannelMessage {
        id: id.to_string(),
        channel_id: "ch-1".to_string(),
        sender_id: "buyer-1".to_string(),
        text: format!("message {id}"),
        created_at,
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Counting in-memory store with per-operation failure switches.
#[derive(Default)]
pub struct MemoryStore {
    ended: Mutex<HashSet<Uuid>>,
    end_calls: AtomicUsize,
    fail_end: AtomicBool,
    activities: Mutex<Vec<(Uuid, ActivityKind, serde_json::Value)>>,
    activity_attempts: AtomicUsize,
    fail_activity: AtomicBool,
    intents: Mutex<Vec<(Uuid, NewPurchaseIntent)>>,
    fail_intents: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempted `end_session` calls, failed ones included.
    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }

    pub fn fail_end_session(&self, fail: bool) {
        self.fail_end.store(fail, Ordering::SeqCst);
    }

    /// Persisted activity as `(session, kind, payload)`, in write order.
    pub fn activities(&self) -> Vec<(Uuid, ActivityKind, serde_json::Value)> {
        self.activities.lock().unwrap().clone()
    }

    pub fn activity_attempts(&self) -> usize {
        self.activity_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_activity(&self, fail: bool) {
        self.fail_activity.store(fail, Ordering::SeqCst);
    }

    pub fn intents(&self) -> Vec<NewPurchaseIntent> {
        self.intents
            .lock()
            .unwrap()
            .iter()
            .map(|(_, i)| i.clone())
            .collect()
    }

    pub fn fail_intents(&self, fail: bool) {
        self.fail_intents.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn end_session(&self, session_id: Uuid) -> Result<(), DatabaseError> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("session store unavailable".into()));
        }
        self.ended.lock().unwrap().insert(session_id);
        Ok(())
    }

    async fn is_session_ended(&self, session_id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.ended.lock().unwrap().contains(&session_id))
    }

    async fn record_activity(
        &self,
        session_id: Uuid,
        _channel_id: &str,
        kind: ActivityKind,
        payload: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        self.activity_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("activity store unavailable".into()));
        }
        self.activities
            .lock()
            .unwrap()
            .push((session_id, kind, payload.clone()));
        Ok(())
    }

    async fn list_activities(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ActivityRecord>, DatabaseError> {
        Ok(self
            .activities
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| *s == session_id)
            .map(|(s, kind, payload)| ActivityRecord {
                id: Uuid::new_v4(),
                session_id: *s,
                channel_id: String::new(),
                kind: *kind,
                payload: payload.clone(),
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn create_purchase_intent(
        &self,
        intent: &NewPurchaseIntent,
    ) -> Result<Uuid, DatabaseError> {
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(DatabaseError::Query("intent store unavailable".into()));
        }
        let id = Uuid::new_v4();
        self.intents.lock().unwrap().push((id, intent.clone()));
        Ok(id)
    }

    async fn list_purchase_intents(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<PurchaseIntentRecord>, DatabaseError> {
        Ok(self
            .intents
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, i)| i.session_id == session_id)
            .map(|(id, i)| PurchaseIntentRecord {
                id: *id,
                intent: i.clone(),
                created_at: Utc::now(),
            })
            .collect())
    }
}

// ── Chat ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel_id: String,
    pub sender_id: String,
    pub text: String,
}

/// Records sends and history queries; serves scripted history pages.
#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<SentMessage>>,
    queries: Mutex<Vec<HistoryQuery>>,
    pages: Mutex<VecDeque<Vec<ChannelMessage>>>,
    info: Mutex<Option<ChannelInfo>>,
    fail_send: AtomicBool,
    fail_fetch: AtomicBool,
    fail_info: AtomicBool,
}

impl RecordingChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<HistoryQuery> {
        self.queries.lock().unwrap().clone()
    }

    /// Queue a page for the next `fetch_history`; an empty queue serves `[]`.
    pub fn push_page(&self, page: Vec<ChannelMessage>) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn set_channel_info(&self, info: ChannelInfo) {
        *self.info.lock().unwrap() = Some(info);
    }

    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_info(&self, fail: bool) {
        self.fail_info.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<(), ChannelError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                channel: channel_id.to_string(),
                reason: "connection reset".into(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            channel_id: channel_id.to_string(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn fetch_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<ChannelMessage>, ChannelError> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ChannelError::FetchFailed {
                channel: query.channel_id.clone(),
                reason: "timeout".into(),
            });
        }
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn get_channel_info(&self, channel_id: &str) -> Result<ChannelInfo, ChannelError> {
        if self.fail_info.load(Ordering::SeqCst) {
            return Err(ChannelError::InfoFailed {
                channel: channel_id.to_string(),
                reason: "not found".into(),
            });
        }
        Ok(self.info.lock().unwrap().clone().unwrap_or_else(|| ChannelInfo {
            channel_id: channel_id.to_string(),
            participants: vec!["seller-1".into(), "buyer-1".into()],
            metadata: serde_json::json!({}),
        }))
    }
}

// ── LLM ─────────────────────────────────────────────────────────────

/// Replays scripted responses in order, then answers with an empty turn.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<ToolCompletionResponse, LlmError>>>,
    requests: Mutex<Vec<ToolCompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Result<ToolCompletionResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn text(text: &str) -> Result<ToolCompletionResponse, LlmError> {
        Ok(response(Some(text.to_string()), Vec::new()))
    }

    /// A turn requesting `calls` as `(name, arguments)`, ids `call_0..`.
    pub fn tool_calls(
        text: Option<&str>,
        calls: Vec<(&str, serde_json::Value)>,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments,
            })
            .collect();
        Ok(response(text.map(str::to_string), calls))
    }

    pub fn failure() -> Result<ToolCompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "scripted".into(),
            reason: "upstream 500".into(),
        })
    }

    pub fn requests(&self) -> Vec<ToolCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn response(content: Option<String>, tool_calls: Vec<ToolCall>) -> ToolCompletionResponse {
    let finish_reason = if tool_calls.is_empty() {
        FinishReason::Stop
    } else {
        FinishReason::ToolUse
    };
    ToolCompletionResponse {
        content,
        tool_calls,
        input_tokens: 10,
        output_tokens: 5,
        finish_reason,
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(response(None, Vec::new())))
    }
}
