use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::AdapterError;
use crate::protocol::agent::AgentRecord;
use crate::protocol::openai_chat::ChatCompletionRequest;
use crate::state::AppState;
use crate::stream::sse::sse_response;
use crate::stream::{
    record_stream, translate, ChunkContext, ResponseStreamer, StreamEnd, StreamerState,
};
use crate::util::completion_id;

/// `POST /v1/chat/completions`.
///
/// Errors raised before the upstream accepted the turn become JSON error
/// responses. Once streaming has started, failures can only end the stream.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match start_stream(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            if !matches!(err, AdapterError::Upstream { .. }) {
                tracing::error!(error = %err, "chat completion failed before streaming");
            }
            err.into_response()
        }
    }
}

async fn start_stream(state: &AppState, body: &[u8]) -> Result<Response, AdapterError> {
    let request: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|err| AdapterError::InvalidRequest(format!("Invalid JSON body: {err}")))?;
    let user_message = request.latest_user_message(&state.config.adapter.default_greeting);

    let turn = state.upstream.new_turn(user_message);
    tracing::info!(
        thread_id = %turn.thread_id,
        history_len = request.messages.len(),
        "new chat completion request"
    );

    let upstream_response = state.upstream.send_turn(&turn).await?;

    let mut streamer = ResponseStreamer::new(ChunkContext::new(
        completion_id(),
        state.model_name(),
    ));
    let headers = streamer
        .commit()
        .map_err(|err| AdapterError::Internal(err.to_string()))?;

    let records = record_stream(
        upstream_response.bytes_stream(),
        state.config.adapter.max_line_bytes,
    );
    let body = Body::from_stream(sse_body_stream(records, streamer, turn.thread_id));
    Ok(sse_response(headers, body))
}

struct PumpState<R> {
    records: Pin<Box<R>>,
    streamer: ResponseStreamer,
    thread_id: String,
}

/// Drive decoded upstream records through the translator into SSE frames.
///
/// Frames are yielded in upstream order. Clean upstream EOF yields the stop
/// chunk and `[DONE]`; an upstream failure yields an error item, which makes
/// the server drop the connection without a sentinel.
pub fn sse_body_stream<R>(
    records: R,
    streamer: ResponseStreamer,
    thread_id: String,
) -> impl Stream<Item = Result<Bytes, AdapterError>> + Send
where
    R: Stream<Item = Result<AgentRecord, AdapterError>> + Send + 'static,
{
    let state = PumpState {
        records: Box::pin(records),
        streamer,
        thread_id,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.streamer.state() == StreamerState::Finalized {
                return None;
            }
            match state.records.as_mut().next().await {
                Some(Ok(record)) => {
                    let Some(chunk) = translate(record, state.streamer.context()) else {
                        continue;
                    };
                    match state.streamer.write_chunk(&chunk) {
                        Ok(frame) => return Some((Ok(frame), state)),
                        Err(err) => {
                            state.streamer.finalize(StreamEnd::Aborted);
                            return Some((Err(AdapterError::Internal(err.to_string())), state));
                        }
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        thread_id = %state.thread_id,
                        error = %err,
                        "upstream stream failed after streaming started; closing connection"
                    );
                    state.streamer.finalize(StreamEnd::Aborted);
                    return Some((Err(err), state));
                }
                None => {
                    let tail = state.streamer.finalize(StreamEnd::Completed)?;
                    tracing::debug!(
                        thread_id = %state.thread_id,
                        chunks = state.streamer.chunks_written(),
                        "upstream stream finished"
                    );
                    return Some((Ok(tail), state));
                }
            }
        }
    })
}
