//! Remote execution parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Connection parameters for running a session's process on a remote host.
/// Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshRemoteConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    /// Defer unspecified options (port, user, identity) to `~/.ssh/config`.
    #[serde(default)]
    pub use_ssh_config: bool,
    #[serde(default)]
    pub remote_env: BTreeMap<String, String>,
}

impl SshRemoteConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: None,
            private_key_path: None,
            use_ssh_config: false,
            remote_env: BTreeMap::new(),
        }
    }
}

/// A logical command to run on the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommandOptions {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// The caller will feed the process through stdin.
    #[serde(default)]
    pub use_stdin: bool,
}

impl RemoteCommandOptions {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_remote_config_defaults() {
        let config: SshRemoteConfig = serde_json::from_str(r#"{"host":"dev.example.com"}"#).unwrap();
        assert_eq!(config.port, 22);
        assert!(!config.use_ssh_config);
        assert!(config.remote_env.is_empty());
        assert_eq!(config, SshRemoteConfig::new("dev.example.com"));
    }
}
