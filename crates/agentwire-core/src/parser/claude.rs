//! Parser for Claude Code stream-json output.

use super::{OutputParser, decode_object, exit_code_error, looks_like_json};
use crate::Result;
use crate::error_patterns::{classify_agent_line, classify_reported_error};
use crate::usage::normalize_claude_usage;
use agentwire_types::{
    AgentError, AgentErrorKind, ClaudeEvent, ContentBlock, ParsedEvent, ParsedEventKind, ToolType,
    UsageStats,
};
use tracing::trace;

const CONTEXT_WINDOW: u64 = 200_000;

#[derive(Debug, Default)]
pub struct ClaudeOutputParser;

impl ClaudeOutputParser {
    fn decode(event: &ParsedEvent) -> Option<ClaudeEvent> {
        serde_json::from_value(event.raw.clone()).ok()
    }

    /// Map the CLI's assistant `error` codes onto error kinds.
    fn assistant_error_kind(code: &str) -> Option<AgentErrorKind> {
        match code {
            "authentication_failed" => Some(AgentErrorKind::AuthExpired),
            "rate_limit" => Some(AgentErrorKind::RateLimited),
            "billing_error" => Some(AgentErrorKind::TokenExhaustion),
            _ => None,
        }
    }
}

impl OutputParser for ClaudeOutputParser {
    fn tool_type(&self) -> ToolType {
        ToolType::ClaudeCode
    }

    fn parse_json_line(&self, line: &str) -> Result<ParsedEvent> {
        let raw = decode_object(line)?;
        let event = match serde_json::from_value::<ClaudeEvent>(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                // Known type with an unexpected shape; keep it but ignore it.
                trace!(target: "agentwire::parser", "Unrecognised Claude event shape: {}", e);
                return Ok(ParsedEvent::new(ParsedEventKind::System, raw));
            }
        };

        let parsed = match event {
            ClaudeEvent::System(system) => {
                let kind = if system.subtype == "init" {
                    ParsedEventKind::Init
                } else {
                    ParsedEventKind::System
                };
                let mut parsed = ParsedEvent::new(kind, raw);
                parsed.session_id = system.session_id;
                parsed
            }
            ClaudeEvent::Assistant(assistant) => {
                let tool_name = assistant.message.content.iter().find_map(|block| match block {
                    ContentBlock::ToolUse { name, .. } => Some(name.clone()),
                    _ => None,
                });
                let text = assistant.message.text();
                let kind = if assistant.error.is_some() {
                    ParsedEventKind::Error
                } else if text.is_some() {
                    ParsedEventKind::Text
                } else if tool_name.is_some() {
                    ParsedEventKind::ToolUse
                } else {
                    ParsedEventKind::System
                };
                let mut parsed = ParsedEvent::new(kind, raw);
                parsed.text = text;
                parsed.tool_name = tool_name;
                parsed.session_id = assistant.session_id;
                parsed
            }
            ClaudeEvent::StreamEvent(stream) => match stream.text_delta() {
                Some(delta) => {
                    let mut parsed = ParsedEvent::new(ParsedEventKind::Text, raw)
                        .with_text(delta)
                        .partial();
                    parsed.session_id = stream.session_id;
                    parsed
                }
                None => {
                    let mut parsed = ParsedEvent::new(ParsedEventKind::System, raw);
                    parsed.session_id = stream.session_id;
                    parsed
                }
            },
            ClaudeEvent::Result(result) => {
                let mut parsed = ParsedEvent::new(ParsedEventKind::Result, raw).with_text(result.result);
                parsed.session_id = result.session_id;
                parsed
            }
            ClaudeEvent::User(user) => {
                let mut parsed = ParsedEvent::new(ParsedEventKind::System, raw);
                parsed.session_id = user.session_id;
                parsed
            }
            ClaudeEvent::Unknown => ParsedEvent::new(ParsedEventKind::System, raw),
        };
        Ok(parsed)
    }

    fn extract_usage(&self, event: &ParsedEvent) -> Option<UsageStats> {
        if event.kind != ParsedEventKind::Result {
            return None;
        }
        match Self::decode(event)? {
            ClaudeEvent::Result(result) => {
                normalize_claude_usage(result.usage.as_ref(), &result.model_usage, result.total_cost_usd)
            }
            _ => None,
        }
    }

    fn extract_session_id(&self, event: &ParsedEvent) -> Option<String> {
        event.session_id.clone().filter(|id| !id.is_empty())
    }

    fn extract_slash_commands(&self, event: &ParsedEvent) -> Option<Vec<String>> {
        if event.kind != ParsedEventKind::Init || event.raw.get("slash_commands").is_none() {
            return None;
        }
        match Self::decode(event)? {
            ClaudeEvent::System(system) => Some(system.slash_commands),
            _ => None,
        }
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
            return classify_agent_line(ToolType::ClaudeCode, trimmed);
        }

        match serde_json::from_str::<ClaudeEvent>(trimmed) {
            Ok(ClaudeEvent::Result(result)) if result.is_error => {
                let message = if result.result.is_empty() {
                    format!("Claude Code reported an error ({})", result.subtype)
                } else {
                    result.result
                };
                Some(classify_reported_error(ToolType::ClaudeCode, &message).with_raw(trimmed))
            }
            Ok(ClaudeEvent::Assistant(assistant)) => {
                let code = assistant.error?;
                let message = assistant.message.text().unwrap_or_else(|| code.clone());
                let mut error = classify_reported_error(ToolType::ClaudeCode, &message);
                if let Some(kind) = Self::assistant_error_kind(&code) {
                    error.kind = kind;
                    error.recoverable = kind.is_recoverable();
                }
                Some(error.with_raw(trimmed))
            }
            Ok(_) => None,
            Err(_) => classify_agent_line(ToolType::ClaudeCode, trimmed),
        }
    }

    fn detect_error_from_exit(&self, exit_code: i32, stderr: &str) -> Option<AgentError> {
        exit_code_error(ToolType::ClaudeCode, exit_code, stderr)
    }

    fn usage_is_cumulative(&self) -> bool {
        false
    }

    fn default_context_window(&self) -> u64 {
        CONTEXT_WINDOW
    }
}
