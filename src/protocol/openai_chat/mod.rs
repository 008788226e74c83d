use serde::{Deserialize, Serialize};

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const FINISH_REASON_STOP: &str = "stop";

/// Inbound `OpenAI` Chat Completion request.
///
/// Only `messages` is typed; every other field (`model`, `stream`, sampling
/// parameters) lands in `extra` untouched, whatever its JSON type, since the
/// agent service picks its own model and always streams.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One inbound message. `content` may be a plain string or an array of parts.
/// Roles are not forwarded, so `role` is not read at all.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

impl ChatMessage {
    /// Flatten the message content to plain text.
    ///
    /// Array content keeps only `text` parts, joined with newlines; null or
    /// missing content is the empty string.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.content {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| match part {
                    serde_json::Value::String(text) => Some(text.as_str()),
                    other => other.get("text").and_then(serde_json::Value::as_str),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Some(other) => other.to_string(),
        }
    }
}

impl ChatCompletionRequest {
    /// Text of the most recent message, or `default_greeting` when there is none.
    ///
    /// Earlier turns are never forwarded: every upstream thread starts clean.
    #[must_use]
    pub fn latest_user_message(&self, default_greeting: &str) -> String {
        self.messages
            .last()
            .map_or_else(|| default_greeting.to_string(), ChatMessage::text)
    }
}

/// A streaming chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// A choice within a stream chunk. `finish_reason` serializes as `null` until the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

/// Delta content within a stream choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    #[must_use]
    pub fn content(id: &str, model: &str, created: u64, content: String) -> Self {
        Self::single_choice(id, model, created, Some(content), None)
    }

    #[must_use]
    pub fn stop(id: &str, model: &str, created: u64) -> Self {
        Self::single_choice(id, model, created, None, Some(FINISH_REASON_STOP.to_string()))
    }

    fn single_choice(
        id: &str,
        model: &str,
        created: u64,
        content: Option<String>,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            object: CHUNK_OBJECT.to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta { content },
                finish_reason,
            }],
        }
    }
}

/// `GET /v1/models` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_latest_message_is_forwarded() {
        let request = parse(json!({
            "model": "iaedu-custom",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "second"}
            ],
            "stream": true,
            "temperature": 0.2
        }));
        assert_eq!(request.latest_user_message("Olá"), "second");
    }

    #[test]
    fn test_empty_or_missing_messages_fall_back_to_greeting() {
        assert_eq!(parse(json!({"messages": []})).latest_user_message("Olá"), "Olá");
        assert_eq!(parse(json!({})).latest_user_message("Hi"), "Hi");
    }

    #[test]
    fn test_array_content_keeps_text_parts() {
        let request = parse(json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "describe"},
                    {"type": "image_url", "image_url": {"url": "data:..."}},
                    {"type": "text", "text": "briefly"}
                ]
            }]
        }));
        assert_eq!(request.latest_user_message("Olá"), "describe\nbriefly");
    }

    #[test]
    fn test_unused_fields_of_any_type_are_tolerated() {
        let request = parse(json!({
            "model": 42,
            "stream": "yes",
            "messages": [{"role": null, "content": "hi"}, {"content": "last"}]
        }));
        assert_eq!(request.latest_user_message("Olá"), "last");
        assert_eq!(request.extra["model"], 42);
    }

    #[test]
    fn test_null_content_is_empty() {
        let request = parse(json!({"messages": [{"role": "user", "content": null}]}));
        assert_eq!(request.latest_user_message("Olá"), "");
    }

    #[test]
    fn test_chunk_wire_shape() {
        let chunk = ChatCompletionChunk::content("chatcmpl-1", "iaedu-custom", 10, "Hi".into());
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 10,
                "model": "iaedu-custom",
                "choices": [{"index": 0, "delta": {"content": "Hi"}, "finish_reason": null}]
            })
        );

        let stop = ChatCompletionChunk::stop("chatcmpl-1", "iaedu-custom", 11);
        let value = serde_json::to_value(&stop).unwrap();
        assert_eq!(value["choices"][0]["delta"], json!({}));
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
    }
}
