//! Incremental decoder for the agent service's newline-delimited JSON stream.
//!
//! Bytes arrive in arbitrary network-sized pieces. [`LineDecoder`] buffers
//! them until a `\n` is seen, so a record split across two reads is
//! reassembled before it is parsed. Lines that are not JSON records
//! (keep-alive pings, stray text) are dropped without ending the stream.
use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use memchr::memchr_iter;

use crate::error::AdapterError;
use crate::protocol::agent::AgentRecord;

const COMPACT_THRESHOLD_BYTES: usize = 8 * 1024;
const LOG_PREVIEW_CHARS: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("unterminated upstream line exceeds {limit} bytes (buffered {buffered})")]
    LineTooLong { buffered: usize, limit: usize },
}

/// Line-buffering state machine over an unbounded byte source.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: String,
    read_offset: usize,
    utf8_tail: Vec<u8>,
    max_line_bytes: usize,
}

impl LineDecoder {
    #[must_use]
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            utf8_tail: Vec::new(),
            max_line_bytes,
        }
    }

    /// Feed raw bytes and return the complete, trimmed, non-empty lines.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::LineTooLong`] when the unterminated remainder
    /// grows past the configured limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, DecoderError> {
        let mut out = Vec::new();
        self.feed_into(bytes, &mut out)?;
        Ok(out)
    }

    /// Feed raw bytes and append complete lines into a caller-provided buffer.
    ///
    /// Lines completed by this call are appended even when the call fails on
    /// the size limit afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::LineTooLong`] when the unterminated remainder
    /// grows past the configured limit.
    pub fn feed_into(&mut self, bytes: &[u8], out: &mut Vec<String>) -> Result<(), DecoderError> {
        let scan_start = self.buffer.len();
        self.push_utf8(bytes);

        let mut processed_up_to = self.read_offset;
        let haystack = self.buffer.as_bytes();
        for rel_pos in memchr_iter(b'\n', &haystack[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = self.buffer[processed_up_to..line_end].trim();
            if !line.is_empty() {
                out.push(line.to_owned());
            }
            processed_up_to = line_end + 1;
        }
        self.read_offset = processed_up_to;
        self.compact();

        let buffered = self.buffered_len();
        if buffered > self.max_line_bytes {
            return Err(DecoderError::LineTooLong {
                buffered,
                limit: self.max_line_bytes,
            });
        }
        Ok(())
    }

    /// Bytes held for a line whose terminator has not arrived yet.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.read_offset + self.utf8_tail.len()
    }

    /// End of upstream data. Any unterminated remainder is not a complete
    /// record and is discarded; the number of discarded bytes is returned.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffered_len();
        self.buffer.clear();
        self.read_offset = 0;
        self.utf8_tail.clear();
        discarded
    }

    fn push_utf8(&mut self, bytes: &[u8]) {
        let joined: Vec<u8>;
        let mut rest: &[u8] = if self.utf8_tail.is_empty() {
            bytes
        } else {
            let mut tail = std::mem::take(&mut self.utf8_tail);
            tail.extend_from_slice(bytes);
            joined = tail;
            &joined
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    self.buffer.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[invalid_len..];
                        }
                        None => {
                            // Incomplete multi-byte sequence; wait for the next read.
                            self.utf8_tail.extend_from_slice(after);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn compact(&mut self) {
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2
                || self.read_offset >= COMPACT_THRESHOLD_BYTES);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

/// Parse one complete line as an upstream record. Anything that is not a
/// JSON object of the expected shape is noise and yields `None`.
#[must_use]
pub fn decode_record(line: &str) -> Option<AgentRecord> {
    let value = match serde_json::from_str::<serde_json::Value>(line) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(
                error = %err,
                line = %preview(line),
                "dropping unparseable upstream line"
            );
            return None;
        }
    };
    // Records are tagged objects; arrays would otherwise bind fields by position.
    if !value.is_object() {
        tracing::debug!(line = %preview(line), "dropping non-object upstream line");
        return None;
    }
    match serde_json::from_value::<AgentRecord>(value) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::debug!(
                error = %err,
                line = %preview(line),
                "dropping malformed upstream record"
            );
            None
        }
    }
}

fn preview(line: &str) -> String {
    line.chars().take(LOG_PREVIEW_CHARS).collect()
}

struct RecordStreamState<S> {
    bytes: Pin<Box<S>>,
    decoder: LineDecoder,
    lines: Vec<String>,
    pending: VecDeque<AgentRecord>,
    failure: Option<AdapterError>,
    done: bool,
}

impl<S> RecordStreamState<S> {
    fn queue_lines(&mut self) {
        for line in self.lines.drain(..) {
            if let Some(record) = decode_record(&line) {
                self.pending.push_back(record);
            }
        }
    }
}

/// Turn an upstream body stream into an ordered stream of decoded records.
///
/// A read error ends the stream with [`AdapterError::Transport`]; exceeding
/// the line limit ends it with [`AdapterError::Decode`]. Records decoded
/// before either failure are still yielded first.
pub fn record_stream<S, E>(
    byte_stream: S,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<AgentRecord, AdapterError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = RecordStreamState {
        bytes: Box::pin(byte_stream),
        decoder: LineDecoder::new(max_line_bytes),
        lines: Vec::with_capacity(8),
        pending: VecDeque::with_capacity(8),
        failure: None,
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.pending.pop_front() {
                return Some((Ok(record), state));
            }
            if let Some(err) = state.failure.take() {
                return Some((Err(err), state));
            }
            if state.done {
                return None;
            }

            match state.bytes.as_mut().next().await {
                Some(Ok(chunk)) => {
                    let fed = state.decoder.feed_into(&chunk, &mut state.lines);
                    state.queue_lines();
                    if let Err(err) = fed {
                        state.failure = Some(err.into());
                        state.done = true;
                    }
                }
                Some(Err(err)) => {
                    state.queue_lines();
                    state.failure = Some(AdapterError::Transport(format!(
                        "upstream read failed: {err}"
                    )));
                    state.done = true;
                }
                None => {
                    let discarded = state.decoder.finish();
                    if discarded > 0 {
                        tracing::debug!(
                            discarded_bytes = discarded,
                            "discarding unterminated trailing upstream line"
                        );
                    }
                    state.done = true;
                }
            }
        }
    })
}
