//! Process lifecycle: spawning, input, signals and exit.

use crate::agents::{PromptDelivery, default_shell, requests_json_output, stream_json_user_message};
use crate::buffer::{DEFAULT_MAX_BUFFER_BYTES, DataBufferManager, Utf8ChunkDecoder};
use crate::emitter::{EventEmitter, EventReceiver};
use crate::exit::ExitHandler;
use crate::output::OutputHandler;
use crate::registry::{ChildControl, ManagedProcess, ProcessHandle, ProcessRegistry, StdinMessage};
use crate::ssh::build_ssh_command;
use crate::{AgentwireError, Result};
use agentwire_types::{RemoteCommandOptions, SshRemoteConfig, ToolType};
use portable_pty::{CommandBuilder, PtySize, native_pty_system};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Idle time after which buffered stdout text is flushed.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// How long stdout/stderr readers may keep draining after the child exits.
const READER_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8192;

/// Tunables for a [`ProcessManager`].
#[derive(Debug, Clone)]
pub struct ProcessManagerConfig {
    pub flush_interval: Duration,
    pub max_buffer_bytes: usize,
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Everything needed to start one session.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub session_id: String,
    pub tool_type: ToolType,
    /// Program to run. Ignored for terminal sessions, which run `shell`.
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    pub prompt: Option<String>,
    pub prompt_delivery: PromptDelivery,
    pub requires_pty: bool,
    pub shell: Option<String>,
    /// Overrides the provider's default context window.
    pub context_window: Option<u64>,
    pub ssh_remote: Option<SshRemoteConfig>,
    pub ssh_remote_id: Option<String>,
    /// Treat stdout as JSON lines even if the args don't ask for it.
    pub stream_json_output: bool,
    pub cols: u16,
    pub rows: u16,
}

impl SpawnConfig {
    pub fn new(
        session_id: impl Into<String>,
        tool_type: ToolType,
        command: impl Into<String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tool_type,
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
            prompt: None,
            prompt_delivery: PromptDelivery::default(),
            requires_pty: false,
            shell: None,
            context_window: None,
            ssh_remote: None,
            ssh_remote_id: None,
            stream_json_output: false,
            cols: 80,
            rows: 24,
        }
    }

    fn uses_pty(&self) -> bool {
        self.requires_pty || self.tool_type == ToolType::Terminal
    }

    fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnResult {
    pub pid: Option<u32>,
}

/// A one-off shell command streamed as session output.
#[derive(Debug, Clone)]
pub struct RunCommandConfig {
    pub session_id: String,
    pub command: String,
    pub cwd: PathBuf,
    pub shell: Option<String>,
    pub env: BTreeMap<String, String>,
    pub ssh_remote: Option<SshRemoteConfig>,
}

impl RunCommandConfig {
    pub fn new(session_id: impl Into<String>, command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            command: command.into(),
            cwd: cwd.into(),
            shell: None,
            env: BTreeMap::new(),
            ssh_remote: None,
        }
    }
}

/// The program actually executed, after terminal and ssh resolution.
#[derive(Debug)]
struct Launch {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl Launch {
    fn plan(config: &SpawnConfig) -> Self {
        let program = if config.tool_type == ToolType::Terminal {
            config
                .shell
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(default_shell)
        } else {
            config.command.clone()
        };

        let mut args = config.args.clone();
        if config.prompt_delivery == PromptDelivery::Argument {
            if let Some(prompt) = config.prompt() {
                args.push(prompt.to_string());
            }
        }

        match &config.ssh_remote {
            Some(remote) => {
                let mut opts = RemoteCommandOptions::new(program, args);
                opts.cwd = Some(config.cwd.to_string_lossy().into_owned());
                opts.env = config.env.clone();
                opts.use_stdin = config.prompt_delivery != PromptDelivery::Argument;
                let ssh = build_ssh_command(remote, &opts);
                Self {
                    program: ssh.command,
                    args: ssh.args,
                    cwd: None,
                    env: BTreeMap::new(),
                }
            }
            None => Self {
                program: PathBuf::from(program),
                args,
                cwd: Some(config.cwd.clone()),
                env: config.env.clone(),
            },
        }
    }
}

/// Owns every live session's process and wires its output into the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    registry: Arc<ProcessRegistry>,
    emitter: EventEmitter,
    output: OutputHandler,
    exit: ExitHandler,
    flush_interval: Duration,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(ProcessManagerConfig::default())
    }
}

impl ProcessManager {
    pub fn new(config: ProcessManagerConfig) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let emitter = EventEmitter::new();
        let buffers = DataBufferManager::new(emitter.clone(), config.max_buffer_bytes);
        let output = OutputHandler::new(registry.clone(), emitter.clone(), buffers.clone());
        let exit = ExitHandler::new(registry.clone(), emitter.clone(), output.clone(), buffers);
        Self {
            registry,
            emitter,
            output,
            exit,
            flush_interval: config.flush_interval,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.emitter.subscribe()
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn active_sessions(&self) -> Vec<String> {
        self.registry.session_ids()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.registry.contains(session_id)
    }

    /// Start a session. On error nothing is registered.
    pub async fn spawn(&self, config: SpawnConfig) -> Result<SpawnResult> {
        if self.registry.contains(&config.session_id) {
            return Err(AgentwireError::SessionAlreadyExists(config.session_id));
        }

        if config.ssh_remote.is_none() && !config.cwd.exists() {
            error!(target: "agentwire::process", "Working directory does not exist: {:?}", config.cwd);
            return Err(AgentwireError::ProcessSpawnFailed(format!(
                "Working directory does not exist: {:?}",
                config.cwd
            )));
        }

        let launch = Launch::plan(&config);
        info!(
            target: "agentwire::process",
            "Spawning {} session {}: {:?} (remote: {})",
            config.tool_type,
            config.session_id,
            launch.program,
            config.ssh_remote_id.as_deref().unwrap_or("none")
        );
        debug!(target: "agentwire::process", "Args: {:?}", launch.args);

        if config.uses_pty() {
            self.spawn_pty(config, launch)
        } else {
            self.spawn_child(config, launch)
        }
    }

    fn new_process(&self, config: &SpawnConfig, pid: Option<u32>) -> ManagedProcess {
        let mut process = ManagedProcess::new(config.session_id.clone(), config.tool_type);
        process.pid = pid;
        process.cwd = config.cwd.clone();
        process.is_terminal = config.uses_pty();
        process.is_stream_json_mode = !process.is_terminal
            && process.output_parser.is_some()
            && (config.stream_json_output || requests_json_output(&config.args));
        process.is_batch_mode = config.prompt().is_some() && !process.is_terminal;
        if let Some(window) = config.context_window.filter(|w| *w > 0) {
            process.context_window = window;
        }
        process.ssh_remote_id = config.ssh_remote_id.clone();
        process.ssh_remote_host = config.ssh_remote.as_ref().map(|r| r.host.clone());
        process
    }

    fn spawn_child(&self, config: SpawnConfig, launch: Launch) -> Result<SpawnResult> {
        let mut cmd = Command::new(&launch.program);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &launch.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(target: "agentwire::process", "Failed to spawn {:?}: {}", launch.program, e);
            AgentwireError::ProcessSpawnFailed(format!("Failed to spawn {:?}: {}", launch.program, e))
        })?;

        let pid = child.id();
        let (Some(stdin), Some(stdout), Some(stderr)) = (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(AgentwireError::ProcessSpawnFailed("Child stdio was not captured".into()));
        };

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let mut process = self.new_process(&config, pid);
        let is_stream_json = process.is_stream_json_mode;
        let is_batch = process.is_batch_mode;
        process.handle = Some(ProcessHandle::Child {
            stdin_tx: stdin_tx.clone(),
            control_tx,
        });

        if self.registry.register(process).is_err() {
            let _ = child.start_kill();
            return Err(AgentwireError::SessionAlreadyExists(config.session_id));
        }

        if let Some(prompt) = config.prompt() {
            match config.prompt_delivery {
                PromptDelivery::Argument => {}
                PromptDelivery::Stdin => {
                    let _ = stdin_tx.send(StdinMessage::Write(format!("{}\n", prompt).into_bytes()));
                }
                PromptDelivery::StreamJsonStdin => {
                    let line = stream_json_user_message(prompt);
                    let _ = stdin_tx.send(StdinMessage::Write(format!("{}\n", line).into_bytes()));
                }
            }
        }
        if is_batch {
            // One turn per process: the agent waits for EOF before answering.
            let _ = stdin_tx.send(StdinMessage::Close);
        }

        let session_id = config.session_id.clone();
        tokio::spawn(pump_stdin(session_id.clone(), stdin, stdin_rx));

        let stdout_reader = tokio::spawn(read_stdout(
            self.output.clone(),
            session_id.clone(),
            stdout,
            self.flush_interval,
        ));
        let output = self.output.clone();
        let sid = session_id.clone();
        let stderr_reader = tokio::spawn(pump(stderr, move |text| output.handle_stderr(&sid, &text)));

        tokio::spawn(wait_child(
            self.exit.clone(),
            session_id.clone(),
            child,
            control_rx,
            vec![stdout_reader, stderr_reader],
        ));

        info!(
            target: "agentwire::process",
            "Session {} started (pid {:?}, stream-json: {}, batch: {})",
            session_id, pid, is_stream_json, is_batch
        );
        Ok(SpawnResult { pid })
    }

    fn spawn_pty(&self, config: SpawnConfig, launch: Launch) -> Result<SpawnResult> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| AgentwireError::PtyError(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&launch.program);
        cmd.args(&launch.args);
        for (key, value) in &launch.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &launch.cwd {
            cmd.cwd(cwd);
        }

        let mut child = pair.slave.spawn_command(cmd).map_err(|e| {
            error!(target: "agentwire::process", "Failed to spawn {:?} in PTY: {}", launch.program, e);
            AgentwireError::ProcessSpawnFailed(e.to_string())
        })?;
        // The child holds its own copy of the slave; keeping ours would block EOF.
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let reader = pair.master.try_clone_reader();
        let writer = pair.master.take_writer();
        let (mut reader, writer) = match (reader, writer) {
            (Ok(reader), Ok(writer)) => (reader, writer),
            (Err(e), _) | (_, Err(e)) => {
                let _ = child.kill();
                return Err(AgentwireError::PtyError(e.to_string()));
            }
        };
        let writer = Arc::new(std::sync::Mutex::new(writer));

        let mut process = self.new_process(&config, pid);
        process.handle = Some(ProcessHandle::Pty {
            writer: writer.clone(),
            master: Arc::new(std::sync::Mutex::new(pair.master)),
            killer: Arc::new(std::sync::Mutex::new(killer)),
        });

        if self.registry.register(process).is_err() {
            let _ = child.kill();
            return Err(AgentwireError::SessionAlreadyExists(config.session_id));
        }

        let typed_prompt = config
            .prompt()
            .filter(|_| config.prompt_delivery != PromptDelivery::Argument);
        if let Some(prompt) = typed_prompt {
            if let Ok(mut w) = writer.lock() {
                let _ = w.write_all(prompt.trim().as_bytes());
                let _ = w.write_all(b"\r");
                let _ = w.flush();
            }
        }

        let session_id = config.session_id.clone();
        let output = self.output.clone();
        let sid = session_id.clone();
        // PTY reads are blocking.
        let reader_thread = std::thread::spawn(move || {
            let mut decoder = Utf8ChunkDecoder::new();
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        trace!(target: "agentwire::process", "PTY output for {}: {} bytes", sid, n);
                        output.handle_stdout(&sid, &decoder.decode(&buf[..n]));
                        output.flush(&sid);
                    }
                    Err(e) => {
                        // EIO once the child side closes.
                        debug!(target: "agentwire::process", "PTY reader for {} stopped: {}", sid, e);
                        break;
                    }
                }
            }
            let rest = decoder.finish();
            if !rest.is_empty() {
                output.handle_stdout(&sid, &rest);
                output.flush(&sid);
            }
        });

        let exit = self.exit.clone();
        let sid = session_id.clone();
        tokio::spawn(async move {
            let exit_code = match tokio::task::spawn_blocking(move || child.wait()).await {
                Ok(Ok(status)) => status.exit_code() as i32,
                Ok(Err(e)) => {
                    warn!(target: "agentwire::process", "Failed to wait for PTY child {}: {}", sid, e);
                    -1
                }
                Err(e) => {
                    warn!(target: "agentwire::process", "PTY wait task for {} failed: {}", sid, e);
                    -1
                }
            };

            let join = tokio::task::spawn_blocking(move || reader_thread.join());
            if tokio::time::timeout(READER_GRACE, join).await.is_err() {
                warn!(target: "agentwire::process", "PTY reader for {} still running after exit", sid);
            }

            exit.handle_exit(&sid, exit_code);
        });

        info!(target: "agentwire::process", "Terminal session {} started (pid {:?})", session_id, pid);
        Ok(SpawnResult { pid })
    }

    fn handle_of(&self, session_id: &str) -> Option<(ProcessHandle, Option<u32>)> {
        self.registry
            .with_process(session_id, |p| p.handle.clone().map(|h| (h, p.pid)))
            .flatten()
    }

    /// Write raw bytes to a session's input. Returns `false` for unknown sessions.
    pub fn write(&self, session_id: &str, data: &[u8]) -> Result<bool> {
        let Some((handle, _)) = self.handle_of(session_id) else {
            debug!(target: "agentwire::process", "Write to unknown session {}", session_id);
            return Ok(false);
        };
        match handle {
            ProcessHandle::Child { stdin_tx, .. } => {
                stdin_tx
                    .send(StdinMessage::Write(data.to_vec()))
                    .map_err(|_| AgentwireError::ChannelSendError)?;
            }
            ProcessHandle::Pty { writer, .. } => {
                let mut writer = writer
                    .lock()
                    .map_err(|_| AgentwireError::PtyError("PTY writer lock poisoned".into()))?;
                writer.write_all(data)?;
                writer.flush()?;
            }
        }
        Ok(true)
    }

    /// Ctrl-C for PTY sessions, SIGINT for piped children.
    pub fn interrupt(&self, session_id: &str) -> Result<bool> {
        let Some((handle, pid)) = self.handle_of(session_id) else {
            return Ok(false);
        };
        match handle {
            ProcessHandle::Pty { writer, .. } => {
                let mut writer = writer
                    .lock()
                    .map_err(|_| AgentwireError::PtyError("PTY writer lock poisoned".into()))?;
                writer.write_all(b"\x03")?;
                writer.flush()?;
            }
            ProcessHandle::Child { .. } => {
                let Some(pid) = pid else {
                    return Ok(false);
                };
                info!(target: "agentwire::process", "Interrupting session {} (pid {})", session_id, pid);
                send_sigint(pid)?;
            }
        }
        Ok(true)
    }

    /// Terminate a session's process. Exit handling happens when the
    /// process is reaped, not here.
    pub fn kill(&self, session_id: &str) -> Result<bool> {
        let Some((handle, _)) = self.handle_of(session_id) else {
            return Ok(false);
        };
        info!(target: "agentwire::process", "Killing session {}", session_id);
        match handle {
            ProcessHandle::Child { control_tx, .. } => {
                if control_tx.send(ChildControl::Kill).is_err() {
                    debug!(target: "agentwire::process", "Session {} is already exiting", session_id);
                    return Ok(false);
                }
            }
            ProcessHandle::Pty { killer, .. } => {
                let mut killer = killer
                    .lock()
                    .map_err(|_| AgentwireError::PtyError("PTY killer lock poisoned".into()))?;
                killer.kill()?;
            }
        }
        Ok(true)
    }

    /// Resize a PTY session. Returns `false` for unknown or non-PTY sessions.
    pub fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<bool> {
        let Some((ProcessHandle::Pty { master, .. }, _)) = self.handle_of(session_id) else {
            debug!(target: "agentwire::process", "No PTY session {} to resize", session_id);
            return Ok(false);
        };
        let master = master
            .lock()
            .map_err(|_| AgentwireError::PtyError("PTY master lock poisoned".into()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| AgentwireError::PtyError(e.to_string()))?;
        debug!(target: "agentwire::process", "Resized session {} to {}x{}", session_id, cols, rows);
        Ok(true)
    }

    /// Run a shell command to completion, streaming its output as `data` and
    /// `stderr` events, and return its exit code.
    ///
    /// The command is never registered, so its id must not belong to a live
    /// session: the `exit` it ends with would otherwise be a second one.
    pub async fn run_command(&self, config: RunCommandConfig) -> Result<i32> {
        if self.registry.contains(&config.session_id) {
            return Err(AgentwireError::SessionAlreadyExists(config.session_id));
        }

        let (program, args, cwd) = match &config.ssh_remote {
            Some(remote) => {
                let mut opts = RemoteCommandOptions::new("/bin/sh", vec!["-c".to_string(), config.command.clone()]);
                opts.cwd = Some(config.cwd.to_string_lossy().into_owned());
                opts.env = config.env.clone();
                let ssh = build_ssh_command(remote, &opts);
                (ssh.command, ssh.args, None)
            }
            None => {
                let shell = config
                    .shell
                    .clone()
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(default_shell);
                (
                    PathBuf::from(shell),
                    vec!["-c".to_string(), config.command.clone()],
                    Some(config.cwd.clone()),
                )
            }
        };

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &cwd {
            cmd.current_dir(cwd).envs(&config.env);
        }

        info!(target: "agentwire::process", "Running command for session {}: {}", config.session_id, config.command);
        let mut child = cmd.spawn().map_err(|e| {
            error!(target: "agentwire::process", "Failed to run {:?}: {}", program, e);
            AgentwireError::ProcessSpawnFailed(format!("Failed to run {:?}: {}", program, e))
        })?;

        let session_id = config.session_id.clone();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let emitter = self.emitter.clone();
            let sid = session_id.clone();
            readers.push(tokio::spawn(pump(stdout, move |text| emitter.data(&sid, text))));
        }
        if let Some(stderr) = child.stderr.take() {
            let emitter = self.emitter.clone();
            let sid = session_id.clone();
            readers.push(tokio::spawn(pump(stderr, move |text| emitter.stderr(&sid, text))));
        }

        let exit_code = match child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                warn!(target: "agentwire::process", "Failed to wait for command in session {}: {}", session_id, e);
                -1
            }
        };
        join_readers(&session_id, readers).await;

        // Nothing is buffered for a one-shot command, so only `exit` remains.
        info!(target: "agentwire::exit", "Command for session {} exited with code {}", session_id, exit_code);
        self.emitter.exit(&session_id, exit_code);
        Ok(exit_code)
    }
}

async fn pump_stdin(session_id: String, mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<StdinMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            StdinMessage::Write(bytes) => {
                if let Err(e) = stdin.write_all(&bytes).await {
                    debug!(target: "agentwire::process", "Stdin closed for session {}: {}", session_id, e);
                    break;
                }
                let _ = stdin.flush().await;
            }
            StdinMessage::Close => {
                debug!(target: "agentwire::process", "Closing stdin for session {}", session_id);
                break;
            }
        }
    }
}

/// Read stdout, flushing the session's data buffer whenever the stream
/// has been idle for `flush_interval`.
async fn read_stdout<R: AsyncRead + Unpin>(output: OutputHandler, session_id: String, mut stdout: R, flush_interval: Duration) {
    let mut decoder = Utf8ChunkDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut unflushed = false;

    loop {
        match tokio::time::timeout(flush_interval, stdout.read(&mut buf)).await {
            Err(_) => {
                if unflushed {
                    output.flush(&session_id);
                    unflushed = false;
                }
            }
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                output.handle_stdout(&session_id, &decoder.decode(&buf[..n]));
                unflushed = true;
            }
            Ok(Err(e)) => {
                debug!(target: "agentwire::process", "Stdout read failed for session {}: {}", session_id, e);
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        output.handle_stdout(&session_id, &rest);
    }
}

/// Forward decoded text from `reader` to `on_text` until EOF.
async fn pump<R, F>(mut reader: R, mut on_text: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut decoder = Utf8ChunkDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    on_text(text);
                }
            }
            Err(e) => {
                debug!(target: "agentwire::process", "Read failed: {}", e);
                break;
            }
        }
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        on_text(rest);
    }
}

async fn join_readers(session_id: &str, readers: Vec<JoinHandle<()>>) {
    let deadline = tokio::time::Instant::now() + READER_GRACE;
    for mut reader in readers {
        if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
            warn!(target: "agentwire::process", "Output reader for session {} did not finish; abandoning it", session_id);
            reader.abort();
        }
    }
}

async fn wait_child(
    exit: ExitHandler,
    session_id: String,
    mut child: Child,
    mut control_rx: mpsc::UnboundedReceiver<ChildControl>,
    readers: Vec<JoinHandle<()>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Some(ChildControl::Kill) = control_rx.recv() => {
            if let Err(e) = child.start_kill() {
                warn!(target: "agentwire::process", "Failed to kill session {}: {}", session_id, e);
            }
            child.wait().await
        }
    };

    // Signal-terminated children have no code.
    let exit_code = match status {
        Ok(status) => status.code().unwrap_or(-1),
        Err(e) => {
            warn!(target: "agentwire::process", "Failed to wait for session {}: {}", session_id, e);
            -1
        }
    };
    debug!(target: "agentwire::process", "Session {} process exited ({})", session_id, exit_code);

    join_readers(&session_id, readers).await;
    exit.handle_exit(&session_id, exit_code);
}

#[cfg(unix)]
fn send_sigint(pid: u32) -> Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigint(_pid: u32) -> Result<()> {
    Err(AgentwireError::Unsupported("SIGINT is only available on unix".into()))
}
