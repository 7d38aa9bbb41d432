//! Parser for `codex exec --json` output.

use super::{OutputParser, decode_object, exit_code_error, looks_like_json};
use crate::Result;
use crate::error_patterns::{classify_agent_line, classify_reported_error};
use crate::usage::normalize_codex_usage;
use agentwire_types::{AgentError, CodexEvent, CodexItem, ParsedEvent, ParsedEventKind, ToolType, UsageStats};
use tracing::trace;

const CONTEXT_WINDOW: u64 = 400_000;

#[derive(Debug, Default)]
pub struct CodexOutputParser;

impl CodexOutputParser {
    fn parse_item(item: CodexItem, completed: bool, raw: serde_json::Value) -> ParsedEvent {
        if let Some(tool_name) = item.tool_name() {
            return ParsedEvent::new(ParsedEventKind::ToolUse, raw).with_tool_name(tool_name);
        }
        match item {
            CodexItem::AgentMessage { text } if completed => ParsedEvent::new(ParsedEventKind::Text, raw).with_text(text),
            CodexItem::Reasoning { text } if completed => {
                ParsedEvent::new(ParsedEventKind::Text, raw).with_text(text).partial()
            }
            CodexItem::Error { message } => ParsedEvent::new(ParsedEventKind::System, raw).with_text(message),
            _ => ParsedEvent::new(ParsedEventKind::System, raw),
        }
    }
}

impl OutputParser for CodexOutputParser {
    fn tool_type(&self) -> ToolType {
        ToolType::Codex
    }

    fn parse_json_line(&self, line: &str) -> Result<ParsedEvent> {
        let raw = decode_object(line)?;
        let event = match serde_json::from_value::<CodexEvent>(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                trace!(target: "agentwire::parser", "Unrecognised Codex event shape: {}", e);
                return Ok(ParsedEvent::new(ParsedEventKind::System, raw));
            }
        };

        let parsed = match event {
            CodexEvent::ThreadStarted { thread_id } => {
                ParsedEvent::new(ParsedEventKind::Init, raw).with_session_id(thread_id)
            }
            // The answer is the agent messages of the turn, accumulated as they stream.
            CodexEvent::TurnCompleted { .. } => ParsedEvent::new(ParsedEventKind::Result, raw),
            CodexEvent::TurnFailed { error } => {
                let message = error.map(|e| e.message).unwrap_or_default();
                ParsedEvent::new(ParsedEventKind::Error, raw).with_text(message)
            }
            CodexEvent::Error { message } => ParsedEvent::new(ParsedEventKind::Error, raw).with_text(message),
            CodexEvent::ItemStarted { item } | CodexEvent::ItemUpdated { item } => Self::parse_item(item, false, raw),
            CodexEvent::ItemCompleted { item } => Self::parse_item(item, true, raw),
            CodexEvent::TurnStarted | CodexEvent::Unknown => ParsedEvent::new(ParsedEventKind::System, raw),
        };
        Ok(parsed)
    }

    fn extract_usage(&self, event: &ParsedEvent) -> Option<UsageStats> {
        if event.kind != ParsedEventKind::Result {
            return None;
        }
        match serde_json::from_value::<CodexEvent>(event.raw.clone()).ok()? {
            CodexEvent::TurnCompleted { usage: Some(usage) } => Some(normalize_codex_usage(&usage)),
            _ => None,
        }
    }

    fn extract_session_id(&self, event: &ParsedEvent) -> Option<String> {
        if event.kind != ParsedEventKind::Init {
            return None;
        }
        event.session_id.clone().filter(|id| !id.is_empty())
    }

    fn extract_slash_commands(&self, _event: &ParsedEvent) -> Option<Vec<String>> {
        None
    }

    fn is_result_message(&self, event: &ParsedEvent) -> bool {
        event.kind == ParsedEventKind::Result
    }

    fn detect_error_from_line(&self, line: &str) -> Option<AgentError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if !looks_like_json(trimmed) {
            return classify_agent_line(ToolType::Codex, trimmed);
        }

        match serde_json::from_str::<CodexEvent>(trimmed) {
            Ok(CodexEvent::TurnFailed { error }) => {
                let message = error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "Codex turn failed".to_string());
                Some(classify_reported_error(ToolType::Codex, &message).with_raw(trimmed))
            }
            // Transient retries are reported as errors too; only the final failure counts.
            Ok(CodexEvent::Error { message }) if message.starts_with("Reconnecting") => None,
            Ok(CodexEvent::Error { message }) => {
                Some(classify_reported_error(ToolType::Codex, &message).with_raw(trimmed))
            }
            Ok(_) => None,
            Err(_) => classify_agent_line(ToolType::Codex, trimmed),
        }
    }

    fn detect_error_from_exit(&self, exit_code: i32, stderr: &str) -> Option<AgentError> {
        exit_code_error(ToolType::Codex, exit_code, stderr)
    }

    fn usage_is_cumulative(&self) -> bool {
        true
    }

    fn default_context_window(&self) -> u64 {
        CONTEXT_WINDOW
    }
}
