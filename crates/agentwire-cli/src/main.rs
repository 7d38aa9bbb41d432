//! agentwire - run an AI coding agent session and print its events.

use agentwire_cli::{config, logging, session};
use agentwire_core::{ProcessManager, RunCommandConfig, build_ssh_command, shell::shell_escape};
use agentwire_types::{RemoteCommandOptions, SshRemoteConfig, ToolType};
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use config::Config;
use logging::{LogConfig, LogFormat};
use session::{OutputFormat, RunRequest};

/// agentwire - session pipeline for AI coding agents.
#[derive(Parser, Debug)]
#[command(name = "agentwire")]
#[command(about = "Run AI coding agent sessions and stream their canonical events")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging (DEBUG level, excludes per-event traces)
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "parser=debug" or "ssh=trace")
    /// Can be specified multiple times. Targets are prefixed with "agentwire::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an agent (or terminal) session and stream its events
    Run(RunArgs),
    /// Run a shell command line as a session
    Exec(ExecArgs),
    /// Print the ssh invocation a remote session would use
    SshCommand(SshCommandArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Agent to run: claude-code, codex, opencode or terminal
    #[arg(short, long)]
    tool: Option<ToolType>,

    #[arg(short, long)]
    model: Option<String>,

    /// Provider session id to resume
    #[arg(long, value_name = "ID")]
    resume: Option<String>,

    /// Working directory (remote path for --remote sessions)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Run on a remote from the config file
    #[arg(long, value_name = "NAME")]
    remote: Option<String>,

    /// Environment variables for the session
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    #[arg(long, value_name = "ID")]
    session_id: Option<String>,

    /// Run under a pseudo-terminal
    #[arg(long)]
    pty: bool,

    /// Send the prompt on stdin instead of as an argument
    #[arg(long)]
    stdin_prompt: bool,

    /// Forward local stdin lines to the session
    #[arg(short, long)]
    interactive: bool,

    /// Event output format
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    prompt: Option<String>,
}

#[derive(Args, Debug)]
struct ExecArgs {
    #[arg(long)]
    cwd: Option<PathBuf>,

    #[arg(long, value_name = "NAME")]
    remote: Option<String>,

    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    /// Command line, run with `<shell> -c`
    command: String,
}

#[derive(Args, Debug)]
struct SshCommandArgs {
    /// Remote from the config file
    #[arg(long, value_name = "NAME", conflicts_with = "host")]
    remote: Option<String>,

    /// Ad-hoc host (user@host is not parsed; use --user)
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long, value_name = "PATH")]
    identity: Option<String>,

    #[arg(long)]
    cwd: Option<String>,

    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// The caller will write to the remote process's stdin
    #[arg(long)]
    stdin: bool,

    /// Remote program and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::info!(
        target: "agentwire::startup",
        "Loaded configuration (default tool: {}, remotes: {})",
        config.default_tool,
        config.remotes.len()
    );

    let code = match cli.command {
        Command::Run(args) => run(config, args).await?,
        Command::Exec(args) => exec(config, args).await?,
        Command::SshCommand(args) => {
            ssh_command(&config, args)?;
            0
        }
    };
    std::process::exit(code);
}

async fn run(config: Config, args: RunArgs) -> Result<i32> {
    let request = RunRequest {
        session_id: args.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        tool: args.tool,
        model: args.model,
        resume: args.resume,
        cwd: args.cwd,
        remote: args.remote,
        env: session::parse_env_pairs(&args.env)?,
        prompt: args.prompt,
        pty: args.pty,
        stdin_prompt: args.stdin_prompt,
    };
    let spawn = session::build_spawn_config(&config, &request)?;
    let session_id = spawn.session_id.clone();

    let manager = ProcessManager::new(config.manager_config());
    let rx = manager.subscribe();
    let spawned = manager.spawn(spawn).await?;
    tracing::info!(target: "agentwire::startup", "Session {} started (pid: {:?})", session_id, spawned.pid);

    // First Ctrl-C interrupts the agent, the second kills it
    {
        let manager = manager.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            let mut interrupts = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                interrupts += 1;
                let result = if interrupts == 1 {
                    manager.interrupt(&session_id)
                } else {
                    manager.kill(&session_id)
                };
                if let Err(e) = result {
                    tracing::warn!(target: "agentwire::process", "Failed to signal session {}: {}", session_id, e);
                }
            }
        });
    }

    if args.interactive {
        let manager = manager.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match manager.write(&session_id, format!("{}\n", line).as_bytes()) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        tracing::warn!(target: "agentwire::process", "Failed to write to session {}: {}", session_id, e);
                        break;
                    }
                }
            }
        });
    }

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    session::stream_events(rx, &session_id, args.output, &mut stdout, &mut stderr).await
}

async fn exec(config: Config, args: ExecArgs) -> Result<i32> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let mut run = RunCommandConfig::new(
        &session_id,
        args.command,
        args.cwd.unwrap_or_else(|| config.default_cwd.clone()),
    );
    run.shell = Some(config.shell.clone());
    run.env = session::parse_env_pairs(&args.env)?;
    if let Some(remote_id) = &args.remote {
        run.ssh_remote = Some(config.remote(remote_id)?.ssh.clone());
    }

    let manager = ProcessManager::new(config.manager_config());
    let rx = manager.subscribe();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let printer = session::stream_events(rx, &session_id, args.output, &mut stdout, &mut stderr);
    let runner = manager.run_command(run);
    tokio::pin!(printer, runner);

    // A spawn failure never emits exit, so the printer can't be the only thing awaited
    let finished = tokio::select! {
        printed = &mut printer => return printed,
        finished = &mut runner => finished,
    };
    let code = finished?;
    (&mut printer).await?;
    Ok(code)
}

fn ssh_command(config: &Config, args: SshCommandArgs) -> Result<()> {
    let mut remote = match (&args.remote, &args.host) {
        (Some(id), _) => config.remote(id)?.ssh.clone(),
        (None, Some(host)) => SshRemoteConfig::new(host),
        (None, None) => bail!("Either --remote or --host is required"),
    };
    if let Some(port) = args.port {
        remote.port = port;
    }
    if args.user.is_some() {
        remote.username = args.user;
    }
    if args.identity.is_some() {
        remote.private_key_path = args.identity;
    }

    let mut command = args.command.into_iter();
    let Some(program) = command.next() else {
        bail!("A remote command is required");
    };
    let mut opts = RemoteCommandOptions::new(program, command.collect());
    opts.cwd = args.cwd;
    opts.env = session::parse_env_pairs(&args.env)?;
    opts.use_stdin = args.stdin;

    let ssh = build_ssh_command(&remote, &opts);
    let rendered: Vec<String> = std::iter::once(ssh.command.to_string_lossy().into_owned())
        .chain(ssh.args.iter().map(|arg| shell_escape(arg)))
        .collect();
    println!("{}", rendered.join(" "));
    Ok(())
}
