//! Known failure signatures in agent and ssh output.

use agentwire_types::{AgentError, AgentErrorKind, ToolType};
use once_cell::sync::Lazy;
use regex::Regex;

use AgentErrorKind::*;

/// One recognisable failure signature.
#[derive(Debug)]
pub struct ErrorPattern {
    pub kind: AgentErrorKind,
    pub regex: Regex,
    pub message: &'static str,
}

fn pattern(kind: AgentErrorKind, regex: &str, message: &'static str) -> ErrorPattern {
    ErrorPattern {
        kind,
        regex: Regex::new(regex).unwrap(),
        message,
    }
}

static CLAUDE_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        pattern(AuthExpired, r"(?i)invalid api key|authentication_error|oauth token has expired|please run /login", "Authentication failed. Please log in to Claude Code again."),
        pattern(TokenExhaustion, r"(?i)prompt is too long|context (window|length) exceeded|maximum context length", "The conversation exceeded the model's context window."),
        pattern(RateLimited, r"(?i)rate limit|too many requests|\b429\b|overloaded_error|usage limit reached", "Rate limited by the API. Try again shortly."),
        pattern(SessionNotFound, r"(?i)no conversation found with session id", "The session to resume no longer exists."),
        pattern(NetworkError, r"(?i)econnrefused|etimedout|enotfound|network error|connection (reset|refused)|fetch failed", "Network error while contacting the API."),
        pattern(PermissionDenied, r"(?i)permission denied|eacces", "Permission denied."),
    ]
});

static CODEX_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        pattern(AuthExpired, r"(?i)401 unauthorized|not logged in|please run .?codex login|invalid api key|refresh token", "Authentication failed. Please run `codex login`."),
        pattern(TokenExhaustion, r"(?i)context window|context_length_exceeded|maximum context length|quota exceeded|insufficient_quota", "Token or quota limit reached."),
        pattern(RateLimited, r"(?i)rate limit|too many requests|\b429\b|exceeded retry limit", "Rate limited by the API. Try again shortly."),
        pattern(NetworkError, r"(?i)stream disconnected|error sending request|connection (reset|refused)|dns error|timed out", "Network error while contacting the API."),
        pattern(SessionNotFound, r"(?i)(thread|session|conversation) .*not found", "The session to resume no longer exists."),
        pattern(PermissionDenied, r"(?i)permission denied|sandbox denied", "Permission denied."),
    ]
});

static OPENCODE_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        pattern(AuthExpired, r"(?i)providerautherror|invalid api key|unauthorized|no credentials", "Authentication failed. Please configure the OpenCode provider credentials."),
        pattern(TokenExhaustion, r"(?i)context (window|length)|maximum context|too many tokens|insufficient.?quota", "Token or quota limit reached."),
        pattern(RateLimited, r"(?i)rate limit|too many requests|\b429\b|overloaded", "Rate limited by the API. Try again shortly."),
        pattern(SessionNotFound, r"(?i)session .*not found|notfounderror", "The session to resume no longer exists."),
        pattern(NetworkError, r"(?i)econnrefused|etimedout|enotfound|network error|fetch failed", "Network error while contacting the API."),
        pattern(PermissionDenied, r"(?i)permission denied|eacces", "Permission denied."),
    ]
});

static SSH_PATTERNS: Lazy<Vec<ErrorPattern>> = Lazy::new(|| {
    vec![
        pattern(PermissionDenied, r"Permission denied \((publickey|password|keyboard-interactive)[^)]*\)", "SSH authentication failed. Check the key or agent configured for this remote."),
        pattern(PermissionDenied, r"Host key verification failed|REMOTE HOST IDENTIFICATION HAS CHANGED", "SSH host key verification failed for this remote."),
        pattern(NetworkError, r"(?i)ssh: connect to host .* connection refused", "SSH connection refused by the remote host."),
        pattern(NetworkError, r"(?i)ssh: connect to host .* (operation timed out|connection timed out)|connection timed out during banner exchange", "SSH connection timed out."),
        pattern(NetworkError, r"(?i)ssh: could not resolve hostname", "Could not resolve the remote host name."),
        pattern(NetworkError, r"(?i)connection (closed|reset) by .* port \d+|kex_exchange_identification", "SSH connection closed by the remote host."),
        pattern(AgentCrashed, r"(?i)(bash|zsh|sh)(: line \d+)?: .*: (command )?not found", "The agent command was not found on the remote host."),
    ]
});

/// Text patterns for a provider. Terminal sessions have none.
pub fn patterns_for(tool_type: ToolType) -> &'static [ErrorPattern] {
    match tool_type {
        ToolType::ClaudeCode => CLAUDE_PATTERNS.as_slice(),
        ToolType::Codex => CODEX_PATTERNS.as_slice(),
        ToolType::OpenCode => OPENCODE_PATTERNS.as_slice(),
        ToolType::Terminal => &[],
    }
}

/// First pattern in `patterns` matching `text`.
pub fn match_patterns<'a>(patterns: &'a [ErrorPattern], text: &str) -> Option<&'a ErrorPattern> {
    patterns.iter().find(|p| p.regex.is_match(text))
}

/// Classify a line of provider output against the provider's patterns.
pub fn classify_agent_line(tool_type: ToolType, line: &str) -> Option<AgentError> {
    match_patterns(patterns_for(tool_type), line).map(|p| {
        AgentError::new(p.kind, p.message)
            .with_tool_type(tool_type)
            .with_raw(line)
    })
}

/// Classify an error message a provider reported in its own JSON. Always
/// yields an error; the kind falls back to `Unknown` with the provider's text.
pub fn classify_reported_error(tool_type: ToolType, message: &str) -> AgentError {
    let kind = match_patterns(patterns_for(tool_type), message)
        .map(|p| p.kind)
        .unwrap_or(AgentErrorKind::Unknown);
    AgentError::new(kind, message).with_tool_type(tool_type)
}

/// Classify an ssh transport failure line.
pub fn classify_ssh_line(line: &str) -> Option<AgentError> {
    match_patterns(SSH_PATTERNS.as_slice(), line).map(|p| AgentError::new(p.kind, p.message).with_raw(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_publickey_denied() {
        let err = classify_ssh_line("dev@host: Permission denied (publickey,password).").unwrap();
        assert_eq!(err.kind, AgentErrorKind::PermissionDenied);
        assert!(err.message.contains("SSH authentication failed"));
        assert_eq!(err.raw.as_deref(), Some("dev@host: Permission denied (publickey,password)."));
    }

    #[test]
    fn test_ssh_host_key_and_network() {
        assert_eq!(classify_ssh_line("Host key verification failed.").unwrap().kind, AgentErrorKind::PermissionDenied);
        assert_eq!(
            classify_ssh_line("ssh: connect to host 10.0.0.5 port 22: Connection refused").unwrap().kind,
            AgentErrorKind::NetworkError
        );
        assert_eq!(
            classify_ssh_line("ssh: Could not resolve hostname nope: Name or service not known").unwrap().kind,
            AgentErrorKind::NetworkError
        );
        assert_eq!(
            classify_ssh_line("bash: line 1: claude: command not found").unwrap().kind,
            AgentErrorKind::AgentCrashed
        );
    }

    #[test]
    fn test_ssh_ignores_ordinary_output() {
        assert!(classify_ssh_line("Compiling agentwire v0.1.0").is_none());
        assert!(classify_ssh_line("").is_none());
    }

    #[test]
    fn test_agent_patterns_per_provider() {
        let err = classify_agent_line(ToolType::ClaudeCode, "Invalid API key · Please run /login").unwrap();
        assert_eq!(err.kind, AgentErrorKind::AuthExpired);
        assert_eq!(err.tool_type, Some(ToolType::ClaudeCode));
        assert!(err.recoverable);

        let err = classify_agent_line(ToolType::Codex, "stream disconnected before completion").unwrap();
        assert_eq!(err.kind, AgentErrorKind::NetworkError);

        assert!(classify_agent_line(ToolType::Terminal, "rate limit").is_none());
    }

    #[test]
    fn test_reported_error_falls_back_to_unknown() {
        let err = classify_reported_error(ToolType::OpenCode, "something odd happened");
        assert_eq!(err.kind, AgentErrorKind::Unknown);
        assert_eq!(err.message, "something odd happened");
        assert!(!err.recoverable);
    }
}
