//! Parser for `opencode run --format json` output.

use super::{OutputParser, decode_object, exit_code_error, looks_like_json};
use crate::Result;
use crate::error_patterns::{classify_agent_line, classify_reported_error};
use crate::usage::normalize_opencode_usage;
use agentwire_types::{AgentError, OpenCodeEvent, ParsedEvent, ParsedEventKind, ToolType, UsageStats};
use tracing::trace;

const CONTEXT_WINDOW: u64 = 128_000;

#[derive(Debug, Default)]
pub struct OpenCodeOutputParser;

impl OutputParser for OpenCodeOutputParser {
    fn tool_type(&self) -> ToolType {
        ToolType::OpenCode
    }

    fn parse_json_line(&self, line: &str) -> Result<ParsedEvent> {
        let raw = decode_object(line)?;
        let event = match serde_json::from_value::<OpenCodeEvent>(raw.clone()) {
            Ok(event) => event,
            Err(e) => {
                trace!(target: "agentwire::parser", "Unrecognised OpenCode event shape: {}", e);
                return Ok(ParsedEvent::new(ParsedEventKind::System, raw));
            }
        };

        let (mut parsed, session_id) = match event {
            OpenCodeEvent::StepStart { session_id } => (ParsedEvent::new(ParsedEventKind::Init, raw), session_id),
            OpenCodeEvent::Text { session_id, part } => {
                (ParsedEvent::new(ParsedEventKind::Text, raw).with_text(part.text), session_id)
            }
            OpenCodeEvent::ToolUse { session_id, part } => {
                (ParsedEvent::new(ParsedEventKind::ToolUse, raw).with_tool_name(part.tool), session_id)
            }
            // The final step carries no text; the answer is the text parts streamed before it.
            OpenCodeEvent::StepFinish { session_id, part } => {
                let kind = if part.is_final() {
                    ParsedEventKind::Result
                } else {
                    ParsedEventKind::Usage
                };
                (ParsedEvent::new(kind, raw), session_id)
            }
            OpenCodeEvent::Error { session_id, error } => {
                (ParsedEvent::new(ParsedEventKind::Error, raw).with_text(error.message()), session_id)
            }
            OpenCodeEvent::Unknown => (ParsedEvent::new(ParsedEventKind::System, raw), None),
        };
        parsed.session_id = session_id;
        Ok(parsed)
    }

    fn extract_usage(&self, event: &ParsedEvent) -> Option<UsageStats> {
        if !matches!(event.kind, ParsedEventKind::Result | ParsedEventKind::Usage) {
            return None;
        }
        match serde_json::from_value::<OpenCodeEvent>(event.raw.clone()).ok()? {
            OpenCodeEvent::StepFinish { part, .. } => Some(normalize_opencode_usage(&part)),
            _ => None,
        }
    }

    fn extract_session_id(&self, event: &ParsedEvent) -> Option<String> {
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
            return classify_agent_line(ToolType::OpenCode, trimmed);
        }

        match serde_json::from_str::<OpenCodeEvent>(trimmed) {
            Ok(OpenCodeEvent::Error { error, .. }) => {
                let message = error.message();
                let classified = format!("{}: {}", error.name, message);
                let mut agent_error = classify_reported_error(ToolType::OpenCode, &classified);
                agent_error.message = message;
                Some(agent_error.with_raw(trimmed))
            }
            Ok(_) => None,
            Err(_) => classify_agent_line(ToolType::OpenCode, trimmed),
        }
    }

    fn detect_error_from_exit(&self, exit_code: i32, stderr: &str) -> Option<AgentError> {
        exit_code_error(ToolType::OpenCode, exit_code, stderr)
    }

    fn usage_is_cumulative(&self) -> bool {
        false
    }

    fn default_context_window(&self) -> u64 {
        CONTEXT_WINDOW
    }
}
