//! SSH invocation construction for remote sessions.

use crate::shell::{build_remote_command, uses_stream_json_input};
use agentwire_types::{DEFAULT_SSH_PORT, RemoteCommandOptions, SshRemoteConfig};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locations checked before `PATH`; GUI launchers often start with a minimal `PATH`.
const SSH_CANDIDATES: &[&str] = &[
    "/usr/bin/ssh",
    "/usr/local/bin/ssh",
    "/opt/homebrew/bin/ssh",
    "/bin/ssh",
    r"C:\Windows\System32\OpenSSH\ssh.exe",
];

/// Options applied to every invocation so ssh never prompts.
const BATCH_OPTIONS: &[&str] = &[
    "BatchMode=yes",
    "StrictHostKeyChecking=accept-new",
    "ConnectTimeout=10",
    "ClearAllForwardings=yes",
];

static SSH_PATH: Lazy<PathBuf> = Lazy::new(|| {
    let resolved = find_ssh_binary();
    debug!(target: "agentwire::ssh", "Resolved ssh binary: {:?}", resolved);
    resolved
});

/// A ready-to-spawn ssh command. No shell wrapper is involved locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub command: PathBuf,
    pub args: Vec<String>,
}

/// Path to the ssh binary, resolved once per process.
pub fn resolve_ssh_path() -> &'static Path {
    SSH_PATH.as_path()
}

fn find_ssh_binary() -> PathBuf {
    if let Some(found) = SSH_CANDIDATES.iter().map(Path::new).find(|p| p.is_file()) {
        return found.to_path_buf();
    }
    let exe = if cfg!(windows) { "ssh.exe" } else { "ssh" };
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(exe))
                .find(|candidate| candidate.is_file())
        })
        .unwrap_or_else(|| PathBuf::from("ssh"))
}

/// Whether the agent args request one-shot print mode.
pub fn has_print_flag(args: &[String]) -> bool {
    args.iter().any(|arg| arg == "--print" || arg == "-p")
}

/// Force a TTY only for print-mode runs that are not fed stream-json on
/// stdin. Terminal control sequences would corrupt the JSON input stream.
pub fn should_force_tty(opts: &RemoteCommandOptions) -> bool {
    has_print_flag(&opts.args) && !uses_stream_json_input(&opts.args)
}

/// Expand a leading `~` to the local home directory.
fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix("~/") {
        Some(rest) => rest,
        None if path == "~" => "",
        None => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest).to_string_lossy().into_owned(),
        None => path.to_string(),
    }
}

/// Build the ssh invocation that runs `opts` on the host described by `config`:
///
/// `ssh [-tt] [-i <key>] -o BatchMode=yes -o StrictHostKeyChecking=accept-new
/// -o ConnectTimeout=10 -o ClearAllForwardings=yes -o RequestTTY=<no|force>
/// -o LogLevel=ERROR [-p <port>] [<user>@]<host> "<remote command>"`
pub fn build_ssh_command(config: &SshRemoteConfig, opts: &RemoteCommandOptions) -> SshCommand {
    let force_tty = should_force_tty(opts);
    let mut args: Vec<String> = Vec::new();

    if force_tty {
        args.push("-tt".into());
    }

    if let Some(key) = config.private_key_path.as_deref().filter(|k| !k.is_empty()) {
        args.push("-i".into());
        args.push(expand_home(key));
    }

    for option in BATCH_OPTIONS {
        args.push("-o".into());
        args.push((*option).into());
    }
    args.push("-o".into());
    args.push(format!("RequestTTY={}", if force_tty { "force" } else { "no" }));
    args.push("-o".into());
    args.push("LogLevel=ERROR".into());

    if !(config.use_ssh_config && config.port == DEFAULT_SSH_PORT) {
        args.push("-p".into());
        args.push(config.port.to_string());
    }

    args.push(match config.username.as_deref().filter(|u| !u.is_empty()) {
        Some(user) => format!("{}@{}", user, config.host),
        None => config.host.clone(),
    });

    // Per-call env wins over the remote's configured env.
    let mut remote_opts = opts.clone();
    let mut env = config.remote_env.clone();
    env.extend(opts.env.clone());
    remote_opts.env = env;

    let remote_command = build_remote_command(&remote_opts);
    debug!(target: "agentwire::ssh", "Remote command for {}: {}", config.host, remote_command);
    args.push(remote_command);

    SshCommand {
        command: resolve_ssh_path().to_path_buf(),
        args,
    }
}
