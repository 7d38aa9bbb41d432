//! OpenCode event types for `opencode run --format json` output parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-lines events emitted by `opencode run --format json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenCodeEvent {
    StepStart {
        #[serde(default, rename = "sessionID")]
        session_id: Option<String>,
    },
    Text {
        #[serde(default, rename = "sessionID")]
        session_id: Option<String>,
        part: OpenCodeTextPart,
    },
    ToolUse {
        #[serde(default, rename = "sessionID")]
        session_id: Option<String>,
        part: OpenCodeToolPart,
    },
    StepFinish {
        #[serde(default, rename = "sessionID")]
        session_id: Option<String>,
        part: OpenCodeStepFinishPart,
    },
    Error {
        #[serde(default, rename = "sessionID")]
        session_id: Option<String>,
        #[serde(default)]
        error: OpenCodeErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCodeTextPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCodeToolPart {
    #[serde(default)]
    pub tool: String,
    #[serde(default, rename = "callID")]
    pub call_id: Option<String>,
    #[serde(default)]
    pub state: Value,
}

/// End of one model step. `reason` is `"stop"` on the final step of a run
/// and `"tool-calls"` when the model continues after running tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCodeStepFinishPart {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub tokens: OpenCodeTokens,
}

impl OpenCodeStepFinishPart {
    pub fn is_final(&self) -> bool {
        self.reason.as_deref() == Some("stop")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCodeTokens {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
    #[serde(default)]
    pub cache: OpenCodeCacheTokens,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCodeCacheTokens {
    #[serde(default)]
    pub read: u64,
    #[serde(default)]
    pub write: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenCodeErrorBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl OpenCodeErrorBody {
    /// Human-readable message, falling back to the error name.
    pub fn message(&self) -> String {
        match self.data["message"].as_str() {
            Some(message) if !message.is_empty() => message.to_string(),
            _ if !self.name.is_empty() => self.name.clone(),
            _ => "Unknown OpenCode error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_finish_tokens() {
        let line = r#"{"type":"step_finish","sessionID":"ses_1","part":{"type":"step-finish","reason":"stop","cost":0.002,"tokens":{"input":120,"output":30,"reasoning":4,"cache":{"read":50,"write":10}}}}"#;
        let OpenCodeEvent::StepFinish { session_id, part } = serde_json::from_str(line).unwrap() else {
            panic!("Expected step_finish");
        };
        assert_eq!(session_id.as_deref(), Some("ses_1"));
        assert!(part.is_final());
        assert_eq!(part.tokens.cache.read, 50);
    }

    #[test]
    fn test_error_message_fallback() {
        let body = OpenCodeErrorBody {
            name: "ProviderAuthError".into(),
            data: Value::Null,
        };
        assert_eq!(body.message(), "ProviderAuthError");
    }
}
