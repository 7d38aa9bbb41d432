//! Shared helpers for agentwire-core integration tests.

#![allow(dead_code)]

use agentwire_core::{
    DataBufferManager, EventEmitter, EventReceiver, ExitHandler, ManagedProcess, OutputHandler, ProcessRegistry,
};
use agentwire_types::ProcessEvent;
use std::path::PathBuf;
use std::sync::Arc;

/// Path of a file under the workspace's `tests/fixtures/`.
pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("tests")
        .join("fixtures")
        .join(relative)
}

/// Load a recorded agent stdout stream.
pub fn load_stream_fixture(name: &str) -> String {
    let path = fixture_path(&format!("streams/{}.jsonl", name));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e))
}

/// Split `text` into chunks of at most `size` characters, the way reads
/// arrive from a pipe.
pub fn chunked(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

/// The `event` tag of a canonical event, e.g. `"session-id"`.
pub fn event_tag(event: &ProcessEvent) -> String {
    serde_json::to_value(event).unwrap()["event"].as_str().unwrap().to_string()
}

/// Output and exit handlers over one registry, with a subscriber attached.
pub struct Pipeline {
    pub registry: Arc<ProcessRegistry>,
    pub output: OutputHandler,
    pub exit: ExitHandler,
    rx: EventReceiver,
}

impl Pipeline {
    pub fn new() -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let emitter = EventEmitter::new();
        let rx = emitter.subscribe();
        let buffers = DataBufferManager::new(emitter.clone(), 8 * 1024);
        let output = OutputHandler::new(registry.clone(), emitter.clone(), buffers.clone());
        let exit = ExitHandler::new(registry.clone(), emitter, output.clone(), buffers);
        Self {
            registry,
            output,
            exit,
            rx,
        }
    }

    pub fn with_session(process: ManagedProcess) -> Self {
        let pipeline = Self::new();
        pipeline.registry.register(process).unwrap();
        pipeline
    }

    pub fn feed(&self, session_id: &str, stream: &str, chunk_size: usize) {
        for chunk in chunked(stream, chunk_size) {
            self.output.handle_stdout(session_id, &chunk);
        }
    }

    pub fn drain(&mut self) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn data_texts(events: &[ProcessEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProcessEvent::Data { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
