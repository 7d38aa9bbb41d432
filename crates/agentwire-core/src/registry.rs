//! Live session state and the registry that owns it.

use crate::parser::{OutputParser, create_output_parser};
use agentwire_types::{ToolType, UsageStats};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use portable_pty::{ChildKiller, MasterPty};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A one-way boolean. Once tripped it stays set for the life of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latch(bool);

impl Latch {
    pub fn is_set(&self) -> bool {
        self.0
    }

    /// Set the latch. Returns `true` only for the call that set it.
    pub fn trip(&mut self) -> bool {
        !std::mem::replace(&mut self.0, true)
    }
}

/// Messages for the stdin writer task of a piped child.
#[derive(Debug)]
pub enum StdinMessage {
    Write(Vec<u8>),
    Close,
}

/// Out-of-band requests to the task that waits on a piped child.
#[derive(Debug)]
pub enum ChildControl {
    Kill,
}

/// I/O endpoints of a running process. Clones share the same endpoints.
#[derive(Clone)]
pub enum ProcessHandle {
    /// A child with piped stdio. Writes go through the stdin task.
    Child {
        stdin_tx: mpsc::UnboundedSender<StdinMessage>,
        control_tx: mpsc::UnboundedSender<ChildControl>,
    },
    /// A child attached to a pseudo-terminal.
    Pty {
        writer: Arc<Mutex<Box<dyn Write + Send>>>,
        master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
        killer: Arc<Mutex<Box<dyn ChildKiller + Send + Sync>>>,
    },
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessHandle::Child { .. } => f.write_str("ProcessHandle::Child"),
            ProcessHandle::Pty { .. } => f.write_str("ProcessHandle::Pty"),
        }
    }
}

/// Everything known about one live session.
///
/// Mutated only through [`ProcessRegistry::with_process_mut`], which holds
/// the entry lock for the duration of the closure. Output chunks for a
/// session are therefore applied one at a time, in arrival order.
#[derive(Debug)]
pub struct ManagedProcess {
    pub session_id: String,
    pub tool_type: ToolType,
    pub pid: Option<u32>,
    pub cwd: PathBuf,
    pub is_terminal: bool,
    pub start_time: DateTime<Utc>,

    /// Stdout is JSON lines to be parsed.
    pub is_stream_json_mode: bool,
    /// One process per turn; the turn ends with a result message.
    pub is_batch_mode: bool,

    /// Text after the last newline of stream-JSON output.
    pub json_buffer: String,
    /// Bounded tail of raw stdout.
    pub stdout_buffer: String,
    /// Bounded tail of stderr, used to classify exit errors.
    pub stderr_buffer: String,
    /// Display text not yet emitted.
    pub data_buffer: String,
    /// Complete assistant text seen so far, used when no result arrives.
    pub streamed_text: String,

    pub result_emitted: Latch,
    pub session_id_emitted: Latch,
    pub error_emitted: Latch,

    pub context_window: u64,
    pub last_usage_totals: UsageStats,
    pub usage_is_cumulative: bool,

    pub output_parser: Option<Arc<dyn OutputParser>>,

    pub ssh_remote_id: Option<String>,
    pub ssh_remote_host: Option<String>,

    pub(crate) handle: Option<ProcessHandle>,
}

impl ManagedProcess {
    /// A fresh session with the parser and usage defaults for `tool_type`.
    pub fn new(session_id: impl Into<String>, tool_type: ToolType) -> Self {
        let output_parser: Option<Arc<dyn OutputParser>> = create_output_parser(tool_type).map(Arc::from);
        let context_window = output_parser
            .as_ref()
            .map(|p| p.default_context_window())
            .unwrap_or_default();
        let usage_is_cumulative = output_parser
            .as_ref()
            .is_some_and(|p| p.usage_is_cumulative());

        Self {
            session_id: session_id.into(),
            tool_type,
            pid: None,
            cwd: PathBuf::from("."),
            is_terminal: false,
            start_time: Utc::now(),
            is_stream_json_mode: false,
            is_batch_mode: false,
            json_buffer: String::new(),
            stdout_buffer: String::new(),
            stderr_buffer: String::new(),
            data_buffer: String::new(),
            streamed_text: String::new(),
            result_emitted: Latch::default(),
            session_id_emitted: Latch::default(),
            error_emitted: Latch::default(),
            context_window,
            last_usage_totals: UsageStats::default(),
            usage_is_cumulative,
            output_parser,
            ssh_remote_id: None,
            ssh_remote_host: None,
            handle: None,
        }
    }

    /// Stream-JSON batch session, the shape used for agents run with a prompt.
    pub fn stream_json(session_id: impl Into<String>, tool_type: ToolType) -> Self {
        let mut process = Self::new(session_id, tool_type);
        process.is_stream_json_mode = true;
        process.is_batch_mode = true;
        process
    }

    pub fn is_remote(&self) -> bool {
        self.ssh_remote_id.is_some()
    }
}

/// Map from session id to its [`ManagedProcess`].
///
/// At most one entry exists per session id. Removal of an unknown id is a
/// no-op.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    sessions: DashMap<String, ManagedProcess>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `process`. Returns it back if the session id is already taken.
    pub fn register(&self, process: ManagedProcess) -> std::result::Result<(), ManagedProcess> {
        match self.sessions.entry(process.session_id.clone()) {
            Entry::Occupied(_) => {
                warn!(target: "agentwire::process", "Session {} is already registered", process.session_id);
                Err(process)
            }
            Entry::Vacant(slot) => {
                debug!(target: "agentwire::process", "Registered session {}", process.session_id);
                slot.insert(process);
                Ok(())
            }
        }
    }

    pub fn unregister(&self, session_id: &str) -> Option<ManagedProcess> {
        let removed = self.sessions.remove(session_id).map(|(_, p)| p);
        if removed.is_some() {
            debug!(target: "agentwire::process", "Unregistered session {}", session_id);
        }
        removed
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Run `f` with shared access to a session.
    pub fn with_process<R>(&self, session_id: &str, f: impl FnOnce(&ManagedProcess) -> R) -> Option<R> {
        self.sessions.get(session_id).map(|p| f(&p))
    }

    /// Run `f` with exclusive access to a session. `f` must not call back
    /// into the registry.
    pub fn with_process_mut<R>(&self, session_id: &str, f: impl FnOnce(&mut ManagedProcess) -> R) -> Option<R> {
        self.sessions.get_mut(session_id).map(|mut p| f(&mut p))
    }
}
