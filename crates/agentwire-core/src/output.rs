//! Stdout/stderr ingestion.
//!
//! Stream-JSON output is split into lines and each line is run through the
//! session's parser; everything derived from it (session id, usage, tool
//! activity, the turn's answer) is emitted from here. Other output is plain
//! display text and goes straight to the data buffer.

use crate::buffer::{DataBufferManager, MAX_TAIL_BYTES, push_tail};
use crate::emitter::EventEmitter;
use crate::error_patterns::classify_ssh_line;
use crate::parser::OutputParser;
use crate::registry::{ManagedProcess, ProcessRegistry};
use crate::usage::aggregate_usage;
use agentwire_types::{AgentError, ParsedEvent, ParsedEventKind};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Routes process output for registered sessions.
#[derive(Debug, Clone)]
pub struct OutputHandler {
    registry: Arc<ProcessRegistry>,
    emitter: EventEmitter,
    buffers: DataBufferManager,
}

impl OutputHandler {
    pub fn new(registry: Arc<ProcessRegistry>, emitter: EventEmitter, buffers: DataBufferManager) -> Self {
        Self {
            registry,
            emitter,
            buffers,
        }
    }

    /// Handle a stdout chunk. Chunks for unknown sessions are dropped.
    pub fn handle_stdout(&self, session_id: &str, chunk: &str) {
        if self
            .registry
            .with_process_mut(session_id, |process| self.ingest_stdout(process, chunk))
            .is_none()
        {
            debug!(target: "agentwire::parser", "Dropping stdout for unknown session {}", session_id);
        }
    }

    /// Handle a stderr chunk. Chunks for unknown sessions are dropped.
    pub fn handle_stderr(&self, session_id: &str, chunk: &str) {
        if self
            .registry
            .with_process_mut(session_id, |process| self.ingest_stderr(process, chunk))
            .is_none()
        {
            debug!(target: "agentwire::parser", "Dropping stderr for unknown session {}", session_id);
        }
    }

    /// Flush a session's data buffer. Returns whether anything was emitted.
    pub fn flush(&self, session_id: &str) -> bool {
        self.registry
            .with_process_mut(session_id, |process| self.buffers.flush(process))
            .unwrap_or(false)
    }

    pub(crate) fn ingest_stdout(&self, process: &mut ManagedProcess, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        push_tail(&mut process.stdout_buffer, chunk, MAX_TAIL_BYTES);

        if !process.is_stream_json_mode || process.output_parser.is_none() {
            self.buffers.append(process, chunk);
            return;
        }

        process.json_buffer.push_str(chunk);
        while let Some(newline) = process.json_buffer.find('\n') {
            let line: String = process.json_buffer.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !self.process_json_line(process, line) {
                // Not JSON: still worth showing.
                self.buffers.append(process, &format!("{}\n", line));
            }
        }
    }

    pub(crate) fn ingest_stderr(&self, process: &mut ManagedProcess, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        push_tail(&mut process.stderr_buffer, chunk, MAX_TAIL_BYTES);

        if !process.error_emitted.is_set() {
            let parser = process.output_parser.clone();
            let remote = process.is_remote();
            let detected = chunk
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .find_map(|line| {
                    remote
                        .then(|| classify_ssh_line(line))
                        .flatten()
                        .or_else(|| parser.as_ref().and_then(|p| p.detect_error_from_line(line)))
                });
            if let Some(error) = detected {
                self.emit_error(process, error);
            }
        }

        self.emitter.stderr(&process.session_id, chunk);
    }

    /// Run one complete stream-JSON line through the session's parser and
    /// apply its side effects. Returns `false` if the line did not parse.
    pub(crate) fn process_json_line(&self, process: &mut ManagedProcess, line: &str) -> bool {
        let Some(parser) = process.output_parser.clone() else {
            return false;
        };

        if !process.error_emitted.is_set() {
            if let Some(error) = parser.detect_error_from_line(line) {
                self.emit_error(process, error);
            }
        }

        match parser.parse_json_line(line) {
            Ok(event) => {
                trace!(target: "agentwire::parser", "Session {}: {:?} event", process.session_id, event.kind);
                self.apply_event(process, parser.as_ref(), &event);
                true
            }
            Err(e) => {
                debug!(target: "agentwire::parser", "Session {}: unparseable line ({}): {}", process.session_id, e, line);
                false
            }
        }
    }

    fn apply_event(&self, process: &mut ManagedProcess, parser: &dyn OutputParser, event: &ParsedEvent) {
        let session_id = process.session_id.clone();

        if let Some(agent_session_id) = parser.extract_session_id(event) {
            if process.session_id_emitted.trip() {
                debug!(target: "agentwire::parser", "Session {} has agent session {}", session_id, agent_session_id);
                self.emitter.session_id(&session_id, agent_session_id);
            }
        }

        if let Some(commands) = parser.extract_slash_commands(event) {
            self.emitter.slash_commands(&session_id, commands);
        }

        if let Some(report) = parser.extract_usage(event) {
            let totals = aggregate_usage(
                &mut process.last_usage_totals,
                &report,
                process.usage_is_cumulative,
                process.context_window,
            );
            self.emitter.usage(&session_id, totals);
        }

        if let Some(tool_name) = &event.tool_name {
            self.emitter.tool_execution(&session_id, tool_name.clone(), event.raw.clone());
        }

        if event.kind == ParsedEventKind::Text {
            if let Some(text) = event.non_empty_text() {
                self.emitter.thinking_chunk(&session_id, text);
                if !event.is_partial {
                    if !process.streamed_text.is_empty() {
                        process.streamed_text.push_str("\n\n");
                    }
                    process.streamed_text.push_str(text);
                }
            }
        }

        if parser.is_result_message(event) {
            if process.result_emitted.trip() {
                let text = match event.non_empty_text() {
                    Some(text) => text.to_string(),
                    None => process.streamed_text.clone(),
                };
                self.buffers.append(process, &text);
            } else {
                debug!(target: "agentwire::parser", "Session {}: suppressing repeated result", session_id);
            }
        }
    }

    fn emit_error(&self, process: &mut ManagedProcess, error: AgentError) {
        if process.error_emitted.trip() {
            warn!(
                target: "agentwire::parser",
                "Session {}: {:?} error: {}",
                process.session_id, error.kind, error.message
            );
            self.emitter.agent_error(&process.session_id, error);
        }
    }
}
