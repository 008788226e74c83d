//! Wire types for the upstream agent-chat service.
//!
//! Requests are multipart forms scoped to a single thread; responses are
//! newline-delimited JSON records, of which only `{"type":"token"}` carries
//! assistant text.

use serde::Deserialize;

pub const FIELD_CHANNEL_ID: &str = "channel_id";
pub const FIELD_THREAD_ID: &str = "thread_id";
pub const FIELD_USER_INFO: &str = "user_info";
pub const FIELD_MESSAGE: &str = "message";

/// `user_info` is always sent as an empty JSON object.
pub const EMPTY_USER_INFO: &str = "{}";

pub const API_KEY_HEADER: &str = "x-api-key";

pub const TOKEN_KIND: &str = "token";

/// One upstream invocation. Each turn gets its own thread so the agent never
/// sees context from another request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub channel_id: String,
    pub thread_id: String,
    pub user_message: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(channel_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_id: new_thread_id(),
            user_message: user_message.into(),
        }
    }
}

/// Fresh thread identifier backed by a random (v4) UUID.
#[must_use]
pub fn new_thread_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}

/// One decoded upstream line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgentRecord {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl AgentRecord {
    /// Token text, if this record is a token with non-empty content.
    #[must_use]
    pub fn token_content(&self) -> Option<&str> {
        if self.kind != TOKEN_KIND {
            return None;
        }
        self.content.as_deref().filter(|content| !content.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_thread_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| new_thread_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with("req-") && id.len() == 40));
    }

    #[test]
    fn test_turns_get_distinct_threads() {
        let a = ConversationTurn::new("chan", "hello");
        let b = ConversationTurn::new("chan", "hello");
        assert_ne!(a.thread_id, b.thread_id);
        assert_eq!(a.channel_id, "chan");
        assert_eq!(a.user_message, "hello");
    }

    #[test]
    fn test_record_tolerates_unknown_fields() {
        let record: AgentRecord =
            serde_json::from_str(r#"{"type":"token","content":"Hi","seq":3,"meta":{}}"#).unwrap();
        assert_eq!(record.token_content(), Some("Hi"));
    }

    #[test]
    fn test_token_content_allow_list() {
        let cases = [
            (r#"{"type":"token","content":""}"#, None),
            (r#"{"type":"token"}"#, None),
            (r#"{"type":"token","content":null}"#, None),
            (r#"{"type":"heartbeat","content":"x"}"#, None),
            (r#"{"content":"no kind"}"#, None),
            (r#"{"type":"Token","content":"case"}"#, None),
        ];
        for (raw, expected) in cases {
            let record: AgentRecord = serde_json::from_str(raw).unwrap();
            assert_eq!(record.token_content(), expected, "{raw}");
        }
    }
}
