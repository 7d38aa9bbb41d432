//! Per-provider output parsers.
//!
//! Each provider's JSON-lines schema differs, so there is no shared base
//! behaviour beyond a few helpers. A parser is chosen once per session from
//! its [`ToolType`] and kept for the session's lifetime.

mod claude;
mod codex;
mod opencode;

pub use claude::ClaudeOutputParser;
pub use codex::CodexOutputParser;
pub use opencode::OpenCodeOutputParser;

use crate::Result;
use crate::error_patterns::classify_agent_line;
use agentwire_types::{AgentError, AgentErrorKind, ParsedEvent, ToolType, UsageStats};
use serde_json::Value;
use std::fmt::Debug;

/// Exit code of a process stopped by Ctrl-C; not an agent failure.
const EXIT_INTERRUPTED: i32 = 130;

/// Bytes of stderr kept on an exit error for diagnostics.
const MAX_EXIT_DIAGNOSTIC: usize = 2000;

/// Capability interface implemented once per provider.
pub trait OutputParser: Debug + Send + Sync {
    fn tool_type(&self) -> ToolType;

    /// Parse one complete line. Fails on malformed JSON; callers decide how to degrade.
    fn parse_json_line(&self, line: &str) -> Result<ParsedEvent>;

    fn extract_usage(&self, event: &ParsedEvent) -> Option<UsageStats>;

    fn extract_session_id(&self, event: &ParsedEvent) -> Option<String>;

    fn extract_slash_commands(&self, event: &ParsedEvent) -> Option<Vec<String>>;

    /// Whether `event` is the terminal answer of a batch-mode turn.
    fn is_result_message(&self, event: &ParsedEvent) -> bool;

    fn detect_error_from_line(&self, line: &str) -> Option<AgentError>;

    /// Classify a process exit. `stderr` is the captured stderr tail.
    fn detect_error_from_exit(&self, exit_code: i32, stderr: &str) -> Option<AgentError>;

    /// Whether usage reports are running totals rather than deltas.
    fn usage_is_cumulative(&self) -> bool;

    fn default_context_window(&self) -> u64;
}

/// The parser for `tool_type`, or `None` for sessions without structured output.
pub fn create_output_parser(tool_type: ToolType) -> Option<Box<dyn OutputParser>> {
    match tool_type {
        ToolType::ClaudeCode => Some(Box::new(ClaudeOutputParser)),
        ToolType::Codex => Some(Box::new(CodexOutputParser)),
        ToolType::OpenCode => Some(Box::new(OpenCodeOutputParser)),
        ToolType::Terminal => None,
    }
}

/// Decode a line that must hold a JSON object.
fn decode_object(line: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(line.trim())?;
    if !value.is_object() {
        return Err(<serde_json::Error as serde::de::Error>::custom("expected a JSON object").into());
    }
    Ok(value)
}

fn looks_like_json(line: &str) -> bool {
    line.trim_start().starts_with('{')
}

/// Shared exit classification: stderr lines are matched against the
/// provider's patterns (last line first), otherwise the exit is a crash.
fn exit_code_error(tool_type: ToolType, exit_code: i32, stderr: &str) -> Option<AgentError> {
    if exit_code == 0 || exit_code == EXIT_INTERRUPTED {
        return None;
    }

    if let Some(error) = stderr
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .find_map(|l| classify_agent_line(tool_type, l))
    {
        return Some(error);
    }

    let message = if exit_code < 0 {
        format!("{} was terminated by a signal", tool_type.display_name())
    } else {
        format!("{} exited with code {}", tool_type.display_name(), exit_code)
    };
    let mut error = AgentError::new(AgentErrorKind::AgentCrashed, message).with_tool_type(tool_type);
    let tail = tail_chars(stderr.trim(), MAX_EXIT_DIAGNOSTIC);
    if !tail.is_empty() {
        error = error.with_raw(tail);
    }
    Some(error)
}

fn tail_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
