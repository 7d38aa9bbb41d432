//! End-of-process finalisation.

use crate::buffer::DataBufferManager;
use crate::emitter::EventEmitter;
use crate::output::OutputHandler;
use crate::registry::{ManagedProcess, ProcessRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a process exit into its final events.
///
/// For a known session, in order: the unterminated stream-JSON tail is
/// processed, the data buffer is flushed, accumulated assistant text is
/// emitted if the turn produced no result, and an exit error is reported if
/// none was seen earlier. The session is then unregistered and a single
/// `exit` event is emitted. Unknown sessions still get the `exit` event.
#[derive(Debug, Clone)]
pub struct ExitHandler {
    registry: Arc<ProcessRegistry>,
    emitter: EventEmitter,
    output: OutputHandler,
    buffers: DataBufferManager,
}

impl ExitHandler {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        emitter: EventEmitter,
        output: OutputHandler,
        buffers: DataBufferManager,
    ) -> Self {
        Self {
            registry,
            emitter,
            output,
            buffers,
        }
    }

    pub fn handle_exit(&self, session_id: &str, exit_code: i32) {
        let known = self
            .registry
            .with_process_mut(session_id, |process| self.finalize(process, exit_code))
            .is_some();

        if known {
            self.registry.unregister(session_id);
            info!(target: "agentwire::exit", "Session {} exited with code {}", session_id, exit_code);
        } else {
            debug!(target: "agentwire::exit", "Exit for unregistered session {} (code {})", session_id, exit_code);
        }

        self.emitter.exit(session_id, exit_code);
    }

    fn finalize(&self, process: &mut ManagedProcess, exit_code: i32) {
        if process.is_stream_json_mode
            && !process.result_emitted.is_set()
            && !process.json_buffer.trim().is_empty()
        {
            let trailing = std::mem::take(&mut process.json_buffer);
            if !self.output.process_json_line(process, trailing.trim()) {
                debug!(target: "agentwire::exit", "Session {}: emitting unparsed trailing output", process.session_id);
                self.buffers.append(process, &trailing);
            }
        }

        self.buffers.flush(process);

        if process.is_stream_json_mode
            && !process.result_emitted.is_set()
            && !process.streamed_text.is_empty()
        {
            process.result_emitted.trip();
            debug!(
                target: "agentwire::exit",
                "Session {}: no result message, emitting {} bytes of streamed text",
                process.session_id,
                process.streamed_text.len()
            );
            self.emitter.data(&process.session_id, process.streamed_text.clone());
        }

        if !process.error_emitted.is_set() {
            let error = process
                .output_parser
                .as_ref()
                .and_then(|parser| parser.detect_error_from_exit(exit_code, &process.stderr_buffer));
            if let Some(error) = error {
                process.error_emitted.trip();
                warn!(
                    target: "agentwire::exit",
                    "Session {}: {:?} error on exit: {}",
                    process.session_id, error.kind, error.message
                );
                self.emitter.agent_error(&process.session_id, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_types::{AgentErrorKind, ProcessEvent, ToolType};

    struct Harness {
        registry: Arc<ProcessRegistry>,
        exit: ExitHandler,
        rx: crate::EventReceiver,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ProcessRegistry::new());
        let emitter = EventEmitter::default();
        let rx = emitter.subscribe();
        let buffers = DataBufferManager::new(emitter.clone(), 8 * 1024);
        let output = OutputHandler::new(registry.clone(), emitter.clone(), buffers.clone());
        let exit = ExitHandler::new(registry.clone(), emitter, output, buffers);
        Harness { registry, exit, rx }
    }

    impl Harness {
        fn events(&mut self) -> Vec<ProcessEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn data(events: &[ProcessEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::Data { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_trailing_result_is_emitted() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::ClaudeCode);
        process.json_buffer = "{\"type\":\"result\",\"result\":\"Auth Bug Fix\"}".into();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 0);

        let events = h.events();
        assert_eq!(data(&events), vec!["Auth Bug Fix"]);
        assert!(events.last().unwrap().is_exit());
        assert!(!h.registry.contains("s1"));
    }

    #[test]
    fn test_trailing_result_skipped_after_result() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::ClaudeCode);
        process.json_buffer = "{\"type\":\"result\",\"result\":\"Auth Bug Fix\"}".into();
        process.streamed_text = "Streamed".into();
        process.result_emitted.trip();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 0);

        let events = h.events();
        assert!(data(&events).is_empty());
        assert_eq!(
            events,
            vec![ProcessEvent::Exit {
                session_id: "s1".into(),
                exit_code: 0
            }]
        );
    }

    #[test]
    fn test_malformed_trailing_output_is_emitted_verbatim() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::ClaudeCode);
        process.json_buffer = "not valid json at all".into();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 0);

        assert_eq!(data(&h.events()), vec!["not valid json at all"]);
    }

    #[test]
    fn test_empty_result_uses_streamed_text() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::ClaudeCode);
        process.json_buffer = "{\"type\":\"result\",\"result\":\"\"}".into();
        process.streamed_text = "Partial response".into();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 0);

        assert_eq!(data(&h.events()), vec!["Partial response"]);
    }

    #[test]
    fn test_streamed_text_without_result() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::Codex);
        process.streamed_text = "First\n\nSecond".into();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 0);

        assert_eq!(data(&h.events()), vec!["First\n\nSecond"]);
    }

    #[test]
    fn test_trailing_non_result_is_processed_without_raw_text() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::ClaudeCode);
        process.json_buffer = "{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"abc\"}".into();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 0);

        let events = h.events();
        assert!(data(&events).is_empty());
        assert!(matches!(&events[0], ProcessEvent::SessionId { agent_session_id, .. } if agent_session_id == "abc"));
    }

    #[test]
    fn test_buffered_data_flushed_before_exit() {
        let mut h = harness();
        let mut process = ManagedProcess::new("t1", ToolType::Terminal);
        process.data_buffer = "bye\n".into();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("t1", 0);

        let events = h.events();
        assert_eq!(events.len(), 2);
        assert_eq!(data(&events), vec!["bye\n"]);
        assert!(events[1].is_exit());
    }

    #[test]
    fn test_nonzero_exit_reports_crash_once() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::Codex);
        process.stderr_buffer = "panic in worker\n".into();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 101);

        let errors: Vec<_> = h
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProcessEvent::AgentError { error, .. } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, AgentErrorKind::AgentCrashed);
        assert!(errors[0].message.contains("101"));
    }

    #[test]
    fn test_exit_error_suppressed_after_earlier_error() {
        let mut h = harness();
        let mut process = ManagedProcess::stream_json("s1", ToolType::Codex);
        process.error_emitted.trip();
        h.registry.register(process).unwrap();

        h.exit.handle_exit("s1", 1);

        assert!(!h
            .events()
            .iter()
            .any(|e| matches!(e, ProcessEvent::AgentError { .. })));
    }

    #[test]
    fn test_unknown_session_still_exits() {
        let mut h = harness();
        h.exit.handle_exit("ghost", 3);
        assert_eq!(
            h.events(),
            vec![ProcessEvent::Exit {
                session_id: "ghost".into(),
                exit_code: 3
            }]
        );
    }
}
