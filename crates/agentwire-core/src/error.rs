//! Error types for agentwire.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentwireError {
    #[error("Process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("PTY error: {0}")]
    PtyError(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Channel send error")]
    ChannelSendError,
}
