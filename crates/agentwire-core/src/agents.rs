//! Default command lines for each provider.

use agentwire_types::ToolType;
use serde::{Deserialize, Serialize};

/// How the initial prompt reaches the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptDelivery {
    /// Appended as the last command-line argument.
    #[default]
    Argument,
    /// Written to stdin as plain text.
    Stdin,
    /// Written to stdin as one stream-json user message.
    StreamJsonStdin,
}

/// Per-launch choices layered on a provider's defaults.
#[derive(Debug, Clone, Default)]
pub struct AgentLaunch {
    pub model: Option<String>,
    /// Provider session id to continue.
    pub resume: Option<String>,
}

/// Binary name looked up on `PATH` when no path is configured.
pub fn default_binary(tool_type: ToolType) -> String {
    match tool_type {
        ToolType::ClaudeCode => "claude".to_string(),
        ToolType::Codex => "codex".to_string(),
        ToolType::OpenCode => "opencode".to_string(),
        ToolType::Terminal => default_shell(),
    }
}

/// The user's login shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

/// Arguments that run `tool_type` non-interactively with JSON-lines output.
/// The prompt itself is not included.
pub fn build_agent_args(tool_type: ToolType, launch: &AgentLaunch) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    match tool_type {
        ToolType::ClaudeCode => {
            // --verbose is required for stream-json with --print
            args.extend(["--print", "--verbose", "--output-format", "stream-json"].map(String::from));
            if let Some(id) = &launch.resume {
                args.extend(["--resume".to_string(), id.clone()]);
            }
            if let Some(model) = &launch.model {
                args.extend(["--model".to_string(), model.clone()]);
            }
        }
        ToolType::Codex => {
            args.extend(["exec", "--json", "--skip-git-repo-check"].map(String::from));
            if let Some(model) = &launch.model {
                args.extend(["--model".to_string(), model.clone()]);
            }
            if let Some(id) = &launch.resume {
                args.extend(["resume".to_string(), id.clone()]);
            }
        }
        ToolType::OpenCode => {
            args.extend(["run", "--format", "json"].map(String::from));
            if let Some(id) = &launch.resume {
                args.extend(["--session".to_string(), id.clone()]);
            }
            if let Some(model) = &launch.model {
                args.extend(["--model".to_string(), model.clone()]);
            }
        }
        ToolType::Terminal => {}
    }
    args
}

/// Whether `args` ask the agent for JSON-lines output.
pub fn requests_json_output(args: &[String]) -> bool {
    args.iter().enumerate().any(|(i, arg)| {
        let next = args.get(i + 1).map(String::as_str);
        match arg.as_str() {
            "--json" | "--output-format=stream-json" | "--format=json" => true,
            "--output-format" => next == Some("stream-json"),
            "--format" => next == Some("json"),
            _ => false,
        }
    })
}

/// The stdin line carrying `prompt` for agents reading stream-json input.
pub fn stream_json_user_message(prompt: &str) -> String {
    serde_json::json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": prompt }]
        }
    })
    .to_string()
}
