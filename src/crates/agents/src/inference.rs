//! The `InferenceProvider` collaborator interface (spec.md §6.2): the
//! only seam the agent loop calls out to an actual LLM through.
//!
//! Generalized from a single-message-in/single-message-out closure to a
//! trait object that also receives the tool schema list and returns
//! structured tool-call requests, since the spec's agent loop needs to
//! inspect tool calls itself rather than trusting the caller's closure to
//! have encoded them into plain message content.

use async_trait::async_trait;

use crate::error::Result;
use crate::messages::ChatMessage;

/// One tool call as emitted by the provider, before its JSON argument
/// string has been parsed (spec.md §4.6 "parses JSON arguments").
#[derive(Debug, Clone)]
pub struct RawToolCall {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct InferenceOptions {
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct InferenceResponse {
    pub content: String,
    pub tool_calls: Vec<RawToolCall>,
    pub finish_reason: FinishReason,
    pub token_usage: Option<u32>,
}

/// A tool schema as surfaced to the provider alongside the prompt:
/// `(name, description, JSON Schema parameters)`.
pub type ToolSchema = (String, String, serde_json::Value);

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn generate_with_tool_calls(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSchema],
        options: &InferenceOptions,
    ) -> Result<InferenceResponse>;
}
