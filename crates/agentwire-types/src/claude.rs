//! Claude Code event types for stream-json output parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Events emitted by Claude Code in stream-json mode.
/// Matches the output of `claude --print --verbose --output-format stream-json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeEvent {
    /// System initialization with session info.
    System(SystemEvent),
    /// Assistant message (contains the full message object).
    Assistant(AssistantEvent),
    /// User message (tool results fed back to the model).
    User(UserEvent),
    /// Raw API stream event, only with `--include-partial-messages`.
    StreamEvent(StreamEventEnvelope),
    /// Result/summary at the end.
    Result(ResultEvent),
    #[serde(other)]
    Unknown,
}

/// System event with subtype.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub slash_commands: Vec<String>,
}

/// Assistant event containing the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantEvent {
    pub message: AssistantMessage,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    /// Set by the CLI when the API call failed (e.g. `authentication_failed`).
    #[serde(default)]
    pub error: Option<String>,
}

/// The assistant's message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<ClaudeUsage>,
}

impl AssistantMessage {
    /// Concatenated text blocks, or `None` if the message has no text.
    pub fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if parts.is_empty() { None } else { Some(parts.join("")) }
    }
}

/// Content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

/// Token usage as reported on messages and results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaudeUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// User message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Wrapper around a raw Anthropic streaming event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEventEnvelope {
    #[serde(default)]
    pub event: Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl StreamEventEnvelope {
    /// Text carried by a `content_block_delta` / `text_delta` event.
    pub fn text_delta(&self) -> Option<&str> {
        if self.event["type"] != "content_block_delta" || self.event["delta"]["type"] != "text_delta" {
            return None;
        }
        self.event["delta"]["text"].as_str()
    }
}

/// Result event at the end of a turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultEvent {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub usage: Option<ClaudeUsage>,
    /// Per-model breakdown; the only place the CLI reports context windows.
    #[serde(default, rename = "modelUsage")]
    pub model_usage: HashMap<String, ModelUsage>,
}

/// Per-model usage in a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default, rename = "costUSD")]
    pub cost_usd: f64,
    #[serde(default)]
    pub context_window: u64,
}
