use bytes::Bytes;
use http::HeaderMap;

use super::sse::{openai_sse_frame, sse_headers, DONE_FRAME};
use super::translate::ChunkContext;
use crate::protocol::openai_chat::ChatCompletionChunk;

/// Lifecycle of one streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerState {
    NotStarted,
    Streaming,
    Finalized,
}

/// How a committed stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Upstream finished cleanly: emit the stop chunk and the `[DONE]` sentinel.
    Completed,
    /// Upstream failed mid-stream: emit nothing so the client sees an abrupt close.
    Aborted,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    #[error("cannot {op} a response stream in state {state:?}")]
    InvalidState {
        op: &'static str,
        state: StreamerState,
    },
    #[error("failed to serialize chunk: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Owns the outbound side of a streamed completion.
///
/// Frames are produced in call order. [`ResponseStreamer::finalize`] takes
/// effect once; later calls return nothing, so the terminal chunk and the
/// sentinel can never be written twice.
#[derive(Debug)]
pub struct ResponseStreamer {
    ctx: ChunkContext,
    state: StreamerState,
    chunks_written: usize,
}

impl ResponseStreamer {
    #[must_use]
    pub fn new(ctx: ChunkContext) -> Self {
        Self {
            ctx,
            state: StreamerState::NotStarted,
            chunks_written: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> StreamerState {
        self.state
    }

    #[must_use]
    pub fn context(&self) -> &ChunkContext {
        &self.ctx
    }

    #[must_use]
    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    /// Commit to streaming and return the response headers.
    ///
    /// Call only once the upstream has answered with a success status: after
    /// this no status-bearing error response is possible.
    ///
    /// # Errors
    ///
    /// Returns [`StreamerError::InvalidState`] unless the streamer is `NotStarted`.
    pub fn commit(&mut self) -> Result<HeaderMap, StreamerError> {
        self.expect_state("commit", StreamerState::NotStarted)?;
        self.state = StreamerState::Streaming;
        Ok(sse_headers())
    }

    /// Encode one chunk as an SSE frame.
    ///
    /// # Errors
    ///
    /// Returns [`StreamerError::InvalidState`] outside `Streaming`, or
    /// [`StreamerError::Serialize`] if the chunk cannot be encoded.
    pub fn write_chunk(&mut self, chunk: &ChatCompletionChunk) -> Result<Bytes, StreamerError> {
        self.expect_state("write to", StreamerState::Streaming)?;
        let json = serde_json::to_string(chunk)?;
        self.chunks_written += 1;
        Ok(Bytes::from(openai_sse_frame(&json)))
    }

    /// End the stream. Returns the trailing bytes to send, if any.
    ///
    /// Only the first call has an effect. Finalizing a stream that was never
    /// committed just closes it.
    pub fn finalize(&mut self, end: StreamEnd) -> Option<Bytes> {
        let previous = std::mem::replace(&mut self.state, StreamerState::Finalized);
        match (previous, end) {
            (StreamerState::Finalized, _) => None,
            (StreamerState::NotStarted, _) => {
                tracing::debug!(id = %self.ctx.id, "closing response stream that was never committed");
                None
            }
            (StreamerState::Streaming, StreamEnd::Aborted) => {
                tracing::debug!(
                    id = %self.ctx.id,
                    chunks = self.chunks_written,
                    "response stream aborted"
                );
                None
            }
            (StreamerState::Streaming, StreamEnd::Completed) => {
                let stop = self.ctx.stop_chunk();
                let mut out = match serde_json::to_string(&stop) {
                    Ok(json) => openai_sse_frame(&json),
                    Err(err) => {
                        tracing::error!(error = %err, "failed to serialize stop chunk");
                        String::new()
                    }
                };
                out.push_str(DONE_FRAME);
                tracing::debug!(
                    id = %self.ctx.id,
                    chunks = self.chunks_written,
                    "response stream completed"
                );
                Some(Bytes::from(out))
            }
        }
    }

    fn expect_state(&self, op: &'static str, expected: StreamerState) -> Result<(), StreamerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StreamerError::InvalidState {
                op,
                state: self.state,
            })
        }
    }
}

impl Drop for ResponseStreamer {
    fn drop(&mut self) {
        if self.state == StreamerState::Streaming {
            tracing::debug!(
                id = %self.ctx.id,
                chunks = self.chunks_written,
                "response stream dropped before finalize (client disconnected)"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streamer() -> ResponseStreamer {
        ResponseStreamer::new(ChunkContext::new("chatcmpl-7", "iaedu-custom"))
    }

    fn content_chunk(text: &str) -> ChatCompletionChunk {
        ChatCompletionChunk::content("chatcmpl-7", "iaedu-custom", 1, text.to_string())
    }

    #[test]
    fn test_commit_then_write_then_finalize() {
        let mut s = streamer();
        assert_eq!(s.state(), StreamerState::NotStarted);

        let headers = s.commit().unwrap();
        assert_eq!(headers[http::header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(s.state(), StreamerState::Streaming);

        let frame = s.write_chunk(&content_chunk("Hi")).unwrap();
        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("}\n\n"));
        assert!(text.contains("\"content\":\"Hi\""));
        assert_eq!(s.chunks_written(), 1);

        let tail = s.finalize(StreamEnd::Completed).unwrap();
        let tail = std::str::from_utf8(&tail).unwrap();
        let frames: Vec<&str> = tail.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 2);
        let stop: serde_json::Value =
            serde_json::from_str(frames[0].strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(stop["id"], "chatcmpl-7");
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[1], "data: [DONE]");
        assert_eq!(s.state(), StreamerState::Finalized);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut s = streamer();
        s.commit().unwrap();
        assert!(s.finalize(StreamEnd::Completed).is_some());
        assert!(s.finalize(StreamEnd::Completed).is_none());
        assert!(s.finalize(StreamEnd::Aborted).is_none());
    }

    #[test]
    fn test_abort_writes_nothing_and_blocks_completion() {
        let mut s = streamer();
        s.commit().unwrap();
        assert!(s.finalize(StreamEnd::Aborted).is_none());
        assert!(s.finalize(StreamEnd::Completed).is_none());
        assert_eq!(s.state(), StreamerState::Finalized);
    }

    #[test]
    fn test_write_requires_streaming() {
        let mut s = streamer();
        assert!(matches!(
            s.write_chunk(&content_chunk("early")),
            Err(StreamerError::InvalidState {
                state: StreamerState::NotStarted,
                ..
            })
        ));

        s.commit().unwrap();
        s.finalize(StreamEnd::Completed);
        assert!(s.write_chunk(&content_chunk("late")).is_err());
    }

    #[test]
    fn test_commit_only_once() {
        let mut s = streamer();
        s.commit().unwrap();
        assert!(s.commit().is_err());
    }

    #[test]
    fn test_finalize_without_commit_emits_nothing() {
        let mut s = streamer();
        assert!(s.finalize(StreamEnd::Completed).is_none());
        assert!(s.commit().is_err());
    }
}
