//! Agent provider identification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The provider a session runs. Selected once at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    /// Anthropic's Claude Code CLI.
    ClaudeCode,
    /// OpenAI's Codex CLI.
    Codex,
    /// The OpenCode CLI.
    #[serde(rename = "opencode")]
    OpenCode,
    /// A raw terminal shell with no output parser.
    Terminal,
}

impl ToolType {
    /// Canonical string tag, as used on the wire and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::ClaudeCode => "claude-code",
            ToolType::Codex => "codex",
            ToolType::OpenCode => "opencode",
            ToolType::Terminal => "terminal",
        }
    }

    /// Human-readable provider name for messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ToolType::ClaudeCode => "Claude Code",
            ToolType::Codex => "Codex",
            ToolType::OpenCode => "OpenCode",
            ToolType::Terminal => "Terminal",
        }
    }

    /// Whether this is an AI agent (as opposed to a plain shell).
    pub fn is_agent(&self) -> bool {
        !matches!(self, ToolType::Terminal)
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown tool type: '{0}'")]
pub struct UnknownToolType(pub String);

impl FromStr for ToolType {
    type Err = UnknownToolType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude-code" | "claude" => Ok(ToolType::ClaudeCode),
            "codex" => Ok(ToolType::Codex),
            "opencode" => Ok(ToolType::OpenCode),
            "terminal" => Ok(ToolType::Terminal),
            _ => Err(UnknownToolType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_type_from_str() {
        assert_eq!("claude-code".parse::<ToolType>().unwrap(), ToolType::ClaudeCode);
        assert_eq!("Claude".parse::<ToolType>().unwrap(), ToolType::ClaudeCode);
        assert_eq!("opencode".parse::<ToolType>().unwrap(), ToolType::OpenCode);
        assert!("aider".parse::<ToolType>().is_err());
    }

    #[test]
    fn test_tool_type_serde_tags() {
        assert_eq!(serde_json::to_string(&ToolType::ClaudeCode).unwrap(), "\"claude-code\"");
        assert_eq!(serde_json::to_string(&ToolType::OpenCode).unwrap(), "\"opencode\"");
        let parsed: ToolType = serde_json::from_str("\"codex\"").unwrap();
        assert_eq!(parsed, ToolType::Codex);
    }
}
