//! CLI configuration.

use agentwire_core::{ProcessManagerConfig, agents};
use agentwire_types::{SshRemoteConfig, ToolType};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_tool")]
    pub default_tool: ToolType,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "default_cwd")]
    pub default_cwd: PathBuf,
    /// Shell for terminal sessions and `exec`.
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub agents: AgentPaths,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

/// Explicit agent binaries. Unset entries are looked up on `PATH`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentPaths {
    pub claude: Option<PathBuf>,
    pub codex: Option<PathBuf>,
    pub opencode: Option<PathBuf>,
}

/// A named SSH host sessions can run on.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub id: String,
    #[serde(flatten)]
    pub ssh: SshRemoteConfig,
}

fn default_tool() -> ToolType {
    ToolType::ClaudeCode
}

fn default_cwd() -> PathBuf {
    std::env::current_dir()
        .ok()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_shell() -> String {
    agents::default_shell()
}

fn default_flush_interval_ms() -> u64 {
    50
}

fn default_max_buffer_bytes() -> usize {
    agentwire_core::DEFAULT_MAX_BUFFER_BYTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_tool: default_tool(),
            default_model: None,
            default_cwd: default_cwd(),
            shell: default_shell(),
            agents: AgentPaths::default(),
            flush_interval_ms: default_flush_interval_ms(),
            max_buffer_bytes: default_max_buffer_bytes(),
            remotes: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    pub fn manager_config(&self) -> ProcessManagerConfig {
        ProcessManagerConfig {
            flush_interval: Duration::from_millis(self.flush_interval_ms.max(1)),
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }

    /// Program to run for `tool_type`.
    pub fn agent_command(&self, tool_type: ToolType) -> String {
        let configured = match tool_type {
            ToolType::ClaudeCode => self.agents.claude.as_ref(),
            ToolType::Codex => self.agents.codex.as_ref(),
            ToolType::OpenCode => self.agents.opencode.as_ref(),
            ToolType::Terminal => return self.shell.clone(),
        };
        configured
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| agents::default_binary(tool_type))
    }

    pub fn remote(&self, id: &str) -> Result<&RemoteConfig> {
        self.remotes
            .iter()
            .find(|r| r.id == id)
            .with_context(|| format!("No remote named '{}' in config", id))
    }
}
