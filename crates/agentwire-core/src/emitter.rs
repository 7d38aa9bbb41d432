//! Canonical event emission.

use agentwire_types::{AgentError, ProcessEvent, UsageStats};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// Receiving end of one subscription.
pub type EventReceiver = mpsc::UnboundedReceiver<ProcessEvent>;

/// Delivers [`ProcessEvent`]s to every subscriber.
///
/// Each subscriber gets its own unbounded queue, so a slow consumer never
/// loses events; it only holds them in memory until it catches up. Sends
/// are synchronous, so events emitted by one call are observed in emission
/// order. Events sent while nobody is subscribed are dropped.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ProcessEvent>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn emit(&self, event: ProcessEvent) {
        trace!(target: "agentwire::events", "Emitting {:?}", event);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        // Dropped receivers are pruned here.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn data(&self, session_id: &str, text: impl Into<String>) {
        self.emit(ProcessEvent::Data {
            session_id: session_id.to_string(),
            text: text.into(),
        });
    }

    pub fn stderr(&self, session_id: &str, text: impl Into<String>) {
        self.emit(ProcessEvent::Stderr {
            session_id: session_id.to_string(),
            text: text.into(),
        });
    }

    pub fn exit(&self, session_id: &str, exit_code: i32) {
        self.emit(ProcessEvent::Exit {
            session_id: session_id.to_string(),
            exit_code,
        });
    }

    pub fn session_id(&self, session_id: &str, agent_session_id: impl Into<String>) {
        self.emit(ProcessEvent::SessionId {
            session_id: session_id.to_string(),
            agent_session_id: agent_session_id.into(),
        });
    }

    pub fn slash_commands(&self, session_id: &str, commands: Vec<String>) {
        self.emit(ProcessEvent::SlashCommands {
            session_id: session_id.to_string(),
            commands,
        });
    }

    pub fn usage(&self, session_id: &str, usage: UsageStats) {
        self.emit(ProcessEvent::Usage {
            session_id: session_id.to_string(),
            usage,
        });
    }

    pub fn thinking_chunk(&self, session_id: &str, text: impl Into<String>) {
        self.emit(ProcessEvent::ThinkingChunk {
            session_id: session_id.to_string(),
            text: text.into(),
        });
    }

    pub fn tool_execution(&self, session_id: &str, tool_name: impl Into<String>, state: Value) {
        self.emit(ProcessEvent::ToolExecution {
            session_id: session_id.to_string(),
            tool_name: tool_name.into(),
            state,
        });
    }

    pub fn agent_error(&self, session_id: &str, error: AgentError) {
        self.emit(ProcessEvent::AgentError {
            session_id: session_id.to_string(),
            error,
        });
    }
}
