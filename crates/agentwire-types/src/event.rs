//! Parsed provider events and the canonical events emitted to listeners.

use crate::{AgentError, UsageStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The single active tag of a [`ParsedEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParsedEventKind {
    /// Session start; carries the provider session id and, for some
    /// providers, the available slash commands.
    Init,
    /// Assistant text.
    Text,
    /// A tool invocation.
    ToolUse,
    /// Terminal answer for the turn.
    Result,
    /// Usage report without an answer.
    Usage,
    Error,
    /// Anything else the provider emits.
    System,
}

/// One line of provider output, normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEvent {
    pub kind: ParsedEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Text that is a fragment (a streaming delta or reasoning) rather than a
    /// complete piece of the answer.
    #[serde(default)]
    pub is_partial: bool,
    /// The decoded JSON line, consulted by the parser's `extract_*` methods.
    #[serde(default)]
    pub raw: Value,
}

impl ParsedEvent {
    pub fn new(kind: ParsedEventKind, raw: Value) -> Self {
        Self {
            kind,
            text: None,
            session_id: None,
            tool_name: None,
            is_partial: false,
            raw,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tool_name(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn partial(mut self) -> Self {
        self.is_partial = true;
        self
    }

    /// The event text, treating an empty string as absent.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Canonical events, one addressable stream per session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProcessEvent {
    /// Plain text for display.
    Data { session_id: String, text: String },
    /// Standard error output, kept apart from `Data`.
    Stderr { session_id: String, text: String },
    /// Terminal event; exactly once per session.
    Exit { session_id: String, exit_code: i32 },
    /// Provider session id, at most once per session.
    SessionId { session_id: String, agent_session_id: String },
    SlashCommands { session_id: String, commands: Vec<String> },
    /// Running usage totals after aggregation.
    Usage { session_id: String, usage: UsageStats },
    ThinkingChunk { session_id: String, text: String },
    ToolExecution {
        session_id: String,
        tool_name: String,
        #[serde(default)]
        state: Value,
    },
    AgentError { session_id: String, error: AgentError },
}

impl ProcessEvent {
    /// The session this event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            ProcessEvent::Data { session_id, .. }
            | ProcessEvent::Stderr { session_id, .. }
            | ProcessEvent::Exit { session_id, .. }
            | ProcessEvent::SessionId { session_id, .. }
            | ProcessEvent::SlashCommands { session_id, .. }
            | ProcessEvent::Usage { session_id, .. }
            | ProcessEvent::ThinkingChunk { session_id, .. }
            | ProcessEvent::ToolExecution { session_id, .. }
            | ProcessEvent::AgentError { session_id, .. } => session_id,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, ProcessEvent::Exit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_event_tagging() {
        let event = ProcessEvent::SessionId {
            session_id: "s1".into(),
            agent_session_id: "abc".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "session-id");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(event.session_id(), "s1");
    }

    #[test]
    fn test_non_empty_text() {
        let event = ParsedEvent::new(ParsedEventKind::Result, json!({})).with_text("");
        assert_eq!(event.non_empty_text(), None);
        let event = event.with_text("done");
        assert_eq!(event.non_empty_text(), Some("done"));
    }
}
