//! Session pipeline for AI coding agents: spawning, output parsing,
//! buffering, usage and error detection, and exit handling.

pub mod agents;
mod buffer;
mod emitter;
mod error;
pub mod error_patterns;
mod exit;
mod output;
pub mod parser;
mod process;
mod registry;
pub mod shell;
pub mod ssh;
pub mod usage;

pub use agents::{AgentLaunch, PromptDelivery};
pub use buffer::{DEFAULT_MAX_BUFFER_BYTES, DataBufferManager, MAX_TAIL_BYTES, Utf8ChunkDecoder};
pub use emitter::{EventEmitter, EventReceiver};
pub use error::AgentwireError;
pub use exit::ExitHandler;
pub use output::OutputHandler;
pub use parser::{OutputParser, create_output_parser};
pub use process::{
    DEFAULT_FLUSH_INTERVAL, ProcessManager, ProcessManagerConfig, RunCommandConfig, SpawnConfig, SpawnResult,
};
pub use registry::{Latch, ManagedProcess, ProcessRegistry};
pub use ssh::{SshCommand, build_ssh_command};

/// Result type for agentwire operations.
pub type Result<T> = std::result::Result<T, AgentwireError>;
