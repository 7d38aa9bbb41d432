//! Display-text buffering.
//!
//! Output destined for `data` events is accumulated per session and released
//! when the buffer grows past a size cap, when the stdout reader goes idle,
//! after each PTY read, and once at exit.

use crate::emitter::EventEmitter;
use crate::registry::ManagedProcess;
use tracing::trace;

/// Buffered bytes that force a flush (8KB)
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 8 * 1024;

/// Bytes of raw stdout/stderr kept per session (64KB)
pub const MAX_TAIL_BYTES: usize = 64 * 1024;

/// Accumulates display text and emits it as `data` events.
#[derive(Debug, Clone)]
pub struct DataBufferManager {
    emitter: EventEmitter,
    max_buffer_bytes: usize,
}

impl DataBufferManager {
    pub fn new(emitter: EventEmitter, max_buffer_bytes: usize) -> Self {
        Self {
            emitter,
            max_buffer_bytes: max_buffer_bytes.max(1),
        }
    }

    /// Append `text`, flushing if the buffer reaches the size cap.
    pub fn append(&self, process: &mut ManagedProcess, text: &str) {
        if text.is_empty() {
            return;
        }
        process.data_buffer.push_str(text);
        if process.data_buffer.len() >= self.max_buffer_bytes {
            self.flush(process);
        }
    }

    /// Emit the buffered text as one `data` event and clear the buffer.
    /// Returns whether anything was emitted.
    pub fn flush(&self, process: &mut ManagedProcess) -> bool {
        if process.data_buffer.is_empty() {
            return false;
        }
        let text = std::mem::take(&mut process.data_buffer);
        trace!(target: "agentwire::buffer", "Flushing {} bytes for session {}", text.len(), process.session_id);
        self.emitter.data(&process.session_id, text);
        true
    }
}

/// Append `text` to `buf`, dropping from the front so `buf` stays within
/// `max` bytes.
pub fn push_tail(buf: &mut String, text: &str, max: usize) {
    buf.push_str(text);
    if buf.len() <= max {
        return;
    }
    let mut cut = buf.len() - max;
    while !buf.is_char_boundary(cut) {
        cut += 1;
    }
    buf.drain(..cut);
}

/// Decodes a byte stream as UTF-8 across arbitrary read boundaries.
///
/// A multi-byte character split between two reads is held back until its
/// remaining bytes arrive. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(n) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[n..];
                        }
                        None => {
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Drain bytes still held back, e.g. at end of stream.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentwire_types::{ProcessEvent, ToolType};

    fn drain(rx: &mut crate::EventReceiver) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_flush_emits_once_and_clears() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();
        let buffers = DataBufferManager::new(emitter, DEFAULT_MAX_BUFFER_BYTES);
        let mut process = ManagedProcess::new("s1", ToolType::Terminal);

        buffers.append(&mut process, "hello ");
        buffers.append(&mut process, "world");
        assert!(drain(&mut rx).is_empty());

        assert!(buffers.flush(&mut process));
        assert!(!buffers.flush(&mut process));
        assert_eq!(
            drain(&mut rx),
            vec![ProcessEvent::Data {
                session_id: "s1".into(),
                text: "hello world".into()
            }]
        );
        assert!(process.data_buffer.is_empty());
    }

    #[test]
    fn test_append_flushes_at_cap() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();
        let buffers = DataBufferManager::new(emitter, 4);
        let mut process = ManagedProcess::new("s1", ToolType::Terminal);

        buffers.append(&mut process, "ab");
        assert!(drain(&mut rx).is_empty());
        buffers.append(&mut process, "cde");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProcessEvent::Data { text, .. } if text == "abcde"));
    }

    #[test]
    fn test_empty_append_is_ignored() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();
        let buffers = DataBufferManager::new(emitter, 1);
        let mut process = ManagedProcess::new("s1", ToolType::Terminal);
        buffers.append(&mut process, "");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_push_tail_respects_char_boundaries() {
        let mut buf = String::new();
        push_tail(&mut buf, "abcdef", 4);
        assert_eq!(buf, "cdef");

        let mut buf = String::new();
        push_tail(&mut buf, "aé", 2);
        assert_eq!(buf, "é");
    }

    #[test]
    fn test_utf8_decoder_joins_split_characters() {
        let mut decoder = Utf8ChunkDecoder::new();
        let bytes = "héllo".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
