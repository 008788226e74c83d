use crate::protocol::agent::AgentRecord;
use crate::protocol::openai_chat::ChatCompletionChunk;
use crate::util::unix_now_secs;

/// Identity shared by every chunk of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkContext {
    pub id: String,
    pub model: String,
}

impl ChunkContext {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
        }
    }

    #[must_use]
    pub fn stop_chunk(&self) -> ChatCompletionChunk {
        ChatCompletionChunk::stop(&self.id, &self.model, unix_now_secs())
    }
}

/// Map an upstream record to at most one outbound chunk.
///
/// Allow-list: only `token` records with non-empty content produce output.
/// Heartbeats, control records and kinds added upstream later are dropped.
#[must_use]
pub fn translate(record: AgentRecord, ctx: &ChunkContext) -> Option<ChatCompletionChunk> {
    if record.token_content().is_none() {
        return None;
    }
    let content = record.content?;
    Some(ChatCompletionChunk::content(
        &ctx.id,
        &ctx.model,
        unix_now_secs(),
        content,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str, content: Option<&str>) -> AgentRecord {
        AgentRecord {
            kind: kind.to_string(),
            content: content.map(str::to_string),
        }
    }

    #[test]
    fn test_token_becomes_content_chunk() {
        let ctx = ChunkContext::new("chatcmpl-1", "iaedu-custom");
        let chunk = translate(record("token", Some("Hi")), &ctx).unwrap();
        assert_eq!(chunk.id, "chatcmpl-1");
        assert_eq!(chunk.model, "iaedu-custom");
        assert_eq!(chunk.object, "chat.completion.chunk");
        assert_eq!(chunk.choices.len(), 1);
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn test_everything_else_is_filtered() {
        let ctx = ChunkContext::new("chatcmpl-1", "iaedu-custom");
        for rec in [
            record("token", None),
            record("token", Some("")),
            record("heartbeat", Some("x")),
            record("message_end", None),
            record("", Some("orphan")),
            record("some_future_kind", Some("x")),
        ] {
            assert!(translate(rec.clone(), &ctx).is_none(), "{rec:?}");
        }
    }

    #[test]
    fn test_whitespace_token_is_forwarded() {
        let ctx = ChunkContext::new("chatcmpl-1", "m");
        let chunk = translate(record("token", Some(" ")), &ctx).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some(" "));
    }

    #[test]
    fn test_stop_chunk_shares_identity() {
        let ctx = ChunkContext::new("chatcmpl-9", "m");
        let stop = ctx.stop_chunk();
        assert_eq!(stop.id, "chatcmpl-9");
        assert_eq!(stop.choices[0].finish_reason.as_deref(), Some("stop"));
        assert!(stop.choices[0].delta.content.is_none());
    }
}
