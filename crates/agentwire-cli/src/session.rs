//! Drive one session: build its spawn config and print its events.

use crate::config::Config;
use agentwire_core::{AgentLaunch, EventReceiver, PromptDelivery, SpawnConfig, agents};
use agentwire_types::{ProcessEvent, ToolType};
use anyhow::{Result, bail};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// How events are written to the terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Agent text on stdout, annotations on stderr.
    #[default]
    Text,
    /// One JSON object per canonical event on stdout.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// What the user asked `run` to start.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub session_id: String,
    /// Falls back to the configured default tool.
    pub tool: Option<ToolType>,
    pub model: Option<String>,
    pub resume: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Name of a remote from the config file.
    pub remote: Option<String>,
    pub env: BTreeMap<String, String>,
    pub prompt: Option<String>,
    pub pty: bool,
    /// Send the prompt through stdin instead of argv.
    pub stdin_prompt: bool,
}

/// Parse `KEY=VALUE` pairs from the command line.
pub fn parse_env_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid environment variable '{}': expected KEY=VALUE", pair);
        };
        if key.is_empty() {
            bail!("Invalid environment variable '{}': empty name", pair);
        }
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

pub fn build_spawn_config(config: &Config, request: &RunRequest) -> Result<SpawnConfig> {
    let tool_type = request.tool.unwrap_or(config.default_tool);
    let cwd = request.cwd.clone().unwrap_or_else(|| config.default_cwd.clone());

    let mut spawn = SpawnConfig::new(&request.session_id, tool_type, config.agent_command(tool_type), cwd);
    spawn.env = request.env.clone();
    spawn.requires_pty = request.pty;

    if tool_type == ToolType::Terminal {
        spawn.shell = Some(config.shell.clone());
        if request.prompt.is_some() {
            bail!("Terminal sessions do not take a prompt; use `exec` to run a command");
        }
    } else {
        let launch = AgentLaunch {
            model: request.model.clone().or_else(|| config.default_model.clone()),
            resume: request.resume.clone(),
        };
        spawn.args = agents::build_agent_args(tool_type, &launch);
        spawn.prompt = request.prompt.clone();
        spawn.prompt_delivery = if request.stdin_prompt {
            PromptDelivery::Stdin
        } else {
            PromptDelivery::Argument
        };
    }

    if let Some(remote_id) = &request.remote {
        let remote = config.remote(remote_id)?;
        spawn.ssh_remote = Some(remote.ssh.clone());
        spawn.ssh_remote_id = Some(remote.id.clone());
    }

    debug!(
        target: "agentwire::startup",
        "Spawn config for {}: {} {:?} (pty: {}, remote: {:?})",
        spawn.session_id,
        spawn.command,
        spawn.args,
        spawn.requires_pty,
        spawn.ssh_remote_id
    );
    Ok(spawn)
}

/// Text to print for an event in `format`, split by destination stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Stdout(String),
    Stderr(String),
}

pub fn render_event(event: &ProcessEvent, format: OutputFormat) -> Option<Rendered> {
    if format == OutputFormat::Json {
        return serde_json::to_string(event)
            .ok()
            .map(|line| Rendered::Stdout(format!("{}\n", line)));
    }

    match event {
        ProcessEvent::Data { text, .. } => Some(Rendered::Stdout(text.clone())),
        ProcessEvent::Stderr { text, .. } => Some(Rendered::Stderr(text.clone())),
        ProcessEvent::SessionId { agent_session_id, .. } => {
            Some(Rendered::Stderr(format!("[session {}]\n", agent_session_id)))
        }
        ProcessEvent::ThinkingChunk { text, .. } => Some(Rendered::Stderr(format!("[thinking] {}\n", text))),
        ProcessEvent::ToolExecution { tool_name, .. } => Some(Rendered::Stderr(format!("[tool] {}\n", tool_name))),
        ProcessEvent::Usage { usage, .. } => Some(Rendered::Stderr(format!(
            "[usage] in {} / out {} / cache {} / ${:.4} / context {}%\n",
            usage.input_tokens,
            usage.output_tokens,
            usage.cache_read_input_tokens,
            usage.total_cost_usd,
            usage.context_percent()
        ))),
        ProcessEvent::AgentError { error, .. } => {
            let kind = serde_json::to_value(error.kind)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("{:?}", error.kind));
            Some(Rendered::Stderr(format!("[error: {}] {}\n", kind, error.message)))
        }
        ProcessEvent::SlashCommands { .. } | ProcessEvent::Exit { .. } => None,
    }
}

/// Print `session_id`'s events until its exit, returning the exit code.
/// Events for other sessions are ignored.
pub async fn stream_events<O: Write, E: Write>(
    rx: EventReceiver,
    session_id: &str,
    format: OutputFormat,
    out: &mut O,
    err: &mut E,
) -> Result<i32> {
    let mut stream = UnboundedReceiverStream::new(rx);
    while let Some(event) = stream.next().await {
        if event.session_id() != session_id {
            continue;
        }

        match render_event(&event, format) {
            Some(Rendered::Stdout(text)) => {
                out.write_all(text.as_bytes())?;
                out.flush()?;
            }
            Some(Rendered::Stderr(text)) => {
                err.write_all(text.as_bytes())?;
                err.flush()?;
            }
            None => {}
        }

        if let ProcessEvent::Exit { exit_code, .. } = event {
            return Ok(exit_code);
        }
    }
    bail!("Event stream closed before session {} exited", session_id)
}
