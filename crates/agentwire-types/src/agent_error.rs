//! Structured agent errors surfaced to listeners.

use crate::ToolType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a failure reported by an agent or its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentErrorKind {
    /// Credentials missing, expired, or rejected.
    AuthExpired,
    /// Context window or quota exhausted.
    TokenExhaustion,
    /// Provider throttled the request.
    RateLimited,
    /// Connectivity failure (including SSH transport failures).
    NetworkError,
    /// The agent process died or could not be started.
    AgentCrashed,
    /// Filesystem or SSH permission refusal.
    PermissionDenied,
    /// A resume target no longer exists.
    SessionNotFound,
    Unknown,
}

impl AgentErrorKind {
    /// Whether retrying (possibly after user action) can succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AgentErrorKind::AgentCrashed | AgentErrorKind::Unknown)
    }
}

/// An error recognised in agent output or at process exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentError {
    pub kind: AgentErrorKind,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<ToolType>,
    pub timestamp: DateTime<Utc>,
    /// The raw line (or stderr tail) the error was recognised from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl AgentError {
    pub fn new(kind: AgentErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recoverable: kind.is_recoverable(),
            tool_type: None,
            timestamp: Utc::now(),
            raw: None,
        }
    }

    pub fn with_tool_type(mut self, tool_type: ToolType) -> Self {
        self.tool_type = Some(tool_type);
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }
}
