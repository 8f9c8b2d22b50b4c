//! Canonical message history and context compaction (spec.md §4.5 "Memory
//! & Compaction", §4.4 "Deterministic assistant message ID").
//!
//! Same role/content/tool-call shape as a conventional chat history type,
//! generalized from a flat append-only message vector to the reducer the
//! spec requires (append, remove-all tombstone, update-by-id) so the
//! history can live in a checkpointed channel rather than private agent
//! state.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use swarm_checkpoint::SendableValue;

/// A chat message role (spec.md §3 "Agent loop state": `role ∈ {system,
/// user, assistant, tool}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One requested tool invocation, attached to an assistant message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: SendableValue,
}

/// A message in the canonical `messages` channel. `tombstone` marks a
/// remove-all sentinel: when present in an update batch, the reducer
/// drops every message up to and including the last tombstone seen.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tombstone: Option<bool>,
}

impl ChatMessage {
    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::plain(id, Role::System, content)
    }

    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::plain(id, Role::User, content)
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::plain(id, Role::Assistant, content)
    }

    pub fn tool_result(id: impl Into<String>, tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
            tombstone: None,
        }
    }

    pub fn remove_all(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::System,
            content: String::new(),
            tool_call_id: None,
            tool_calls: None,
            tombstone: Some(true),
        }
    }

    fn plain(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self { id: id.into(), role, content: content.into(), tool_call_id: None, tool_calls: None, tombstone: None }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = Some(calls);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map_or(false, |c| !c.is_empty())
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone.unwrap_or(false)
    }
}

/// The `messages` channel reducer (spec.md §4.5): append ordinary
/// messages; a tombstone in the batch drops everything up to and
/// including the last tombstone, from both `current` and the batch
/// itself; same-id messages in the batch replace the current entry with
/// that id rather than appending a duplicate.
pub fn reduce_messages(current: &[ChatMessage], updates: &[ChatMessage]) -> Vec<ChatMessage> {
    let last_tombstone = updates.iter().rposition(|m| m.is_tombstone());
    let (mut history, pending) = match last_tombstone {
        Some(idx) => (Vec::new(), &updates[idx + 1..]),
        None => (current.to_vec(), &updates[..]),
    };

    for update in pending {
        if let Some(existing) = history.iter_mut().find(|m: &&mut ChatMessage| m.id == update.id) {
            *existing = update.clone();
        } else {
            history.push(update.clone());
        }
    }
    history
}

/// Deterministic assistant message ID (spec.md §4.4): `"msg:" +
/// hex(SHA256(b"HMSG1" || taskId || 0x00 || role || 0x00000000))`.
/// Identical replayed inputs always mint the same ID, which is what lets
/// `reduce_messages`'s update-by-id path collapse a retried superstep
/// onto the message it's replacing instead of duplicating it.
pub fn deterministic_message_id(task_id: &str, role: Role) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"HMSG1");
    hasher.update(task_id.as_bytes());
    hasher.update([0x00]);
    hasher.update(role.as_str().as_bytes());
    hasher.update([0x00, 0x00, 0x00, 0x00]);
    format!("msg:{}", hex::encode(hasher.finalize()))
}

/// Counts tokens in a message slice. `swarm-agents` is deliberately
/// decoupled from any specific text-processing library (spec.md §9
/// "Tokenizer as a pure function"); callers supply their own.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, messages: &[ChatMessage]) -> usize;
}

/// A tokenizer that counts whitespace-separated words. Adequate for
/// tests and for callers with no real tokenizer on hand; production
/// callers should supply one backed by their model's actual vocabulary.
pub struct WordCountTokenizer;

impl Tokenizer for WordCountTokenizer {
    fn count_tokens(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| m.content.split_whitespace().count()).sum()
    }
}

/// Compaction policy controlling how the ephemeral `llmInputMessages`
/// slice is derived from the canonical history (spec.md §4.5).
pub struct CompactionPolicy {
    pub max_tokens: usize,
    pub preserve_last_messages: usize,
    pub summary_prefix: Option<String>,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self { max_tokens: usize::MAX, preserve_last_messages: 20, summary_prefix: None }
    }
}

/// Derives the ephemeral model-input slice from canonical history. Never
/// checkpointed; recomputed on every `Model` transition and on resume
/// (spec.md §4.5 "Derived `llmInputMessages` is ephemeral").
pub fn build_llm_input(history: &[ChatMessage], policy: &CompactionPolicy, tokenizer: &dyn Tokenizer) -> Vec<ChatMessage> {
    if tokenizer.count_tokens(history) <= policy.max_tokens {
        return history.to_vec();
    }

    let keep_from = history.len().saturating_sub(policy.preserve_last_messages);
    let mut trimmed: Vec<ChatMessage> = Vec::new();

    if let Some(summary) = &policy.summary_prefix {
        trimmed.push(ChatMessage::system(
            deterministic_message_id("compaction-summary", Role::System),
            summary.clone(),
        ));
    }
    trimmed.extend_from_slice(&history[keep_from..]);
    trimmed
}

/// Running total of tokens observed across the life of a thread
/// (spec.md §4.5 "Token-count channel accumulates monotonically for
/// telemetry"). The channel reducer is `max(current, update)` since
/// the count is already cumulative by construction at the call site.
pub fn token_count_value(history: &[ChatMessage], tokenizer: &dyn Tokenizer) -> SendableValue {
    SendableValue::Int(tokenizer.count_tokens(history) as i64)
}

pub fn messages_to_value(messages: &[ChatMessage]) -> SendableValue {
    let json = serde_json::to_value(messages).expect("ChatMessage always serializes");
    SendableValue::from(json)
}

pub fn messages_from_value(value: &SendableValue) -> Vec<ChatMessage> {
    let json = serde_json::Value::from(value.clone());
    serde_json::from_value(json).unwrap_or_default()
}

pub fn message_map(messages: &[ChatMessage]) -> BTreeMap<String, ChatMessage> {
    messages.iter().map(|m| (m.id.clone(), m.clone())).collect()
}
