use axum::response::{IntoResponse, Response};

use crate::stream::decoder::DecoderError;

/// Message shown to clients for faults that are not the upstream's doing.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Adapter Error";

/// Prefix for errors relayed from the agent service before streaming started.
pub const UPSTREAM_ERROR_PREFIX: &str = "Erro na IA";

const MAX_UPSTREAM_MESSAGE_LEN: usize = 500;

/// Error type shared by the request pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(#[from] DecoderError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdapterError {
    /// HTTP status used when this error is answered before any stream bytes were sent.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            AdapterError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            AdapterError::Upstream { status, .. } => http::StatusCode::from_u16(*status)
                .unwrap_or(http::StatusCode::BAD_GATEWAY),
            AdapterError::Config(_)
            | AdapterError::Transport(_)
            | AdapterError::Decode(_)
            | AdapterError::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal details stay in the logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            AdapterError::InvalidRequest(message) => message.clone(),
            AdapterError::Upstream { message, .. } => {
                format!("{UPSTREAM_ERROR_PREFIX}: {message}")
            }
            AdapterError::Config(_)
            | AdapterError::Transport(_)
            | AdapterError::Decode(_)
            | AdapterError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Format an error as `(status, {"error": message})`.
#[must_use]
pub fn format_error(err: &AdapterError) -> (http::StatusCode, serde_json::Value) {
    (
        err.status_code(),
        serde_json::json!({ "error": err.client_message() }),
    )
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

/// Reduce an upstream error body to a bounded, readable message.
///
/// JSON bodies carrying `error.message` (or a string `error`) are unwrapped;
/// anything else is used verbatim. The result is capped at 500 bytes on a
/// char boundary.
#[must_use]
pub fn sanitize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        let message = json
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(serde_json::Value::as_str);
        if let Some(msg) = message {
            return truncate_message(msg);
        }
    }

    let text = String::from_utf8_lossy(body);
    truncate_message(text.trim())
}

fn truncate_message(msg: &str) -> String {
    if msg.len() <= MAX_UPSTREAM_MESSAGE_LEN {
        return msg.to_string();
    }
    let mut end = MAX_UPSTREAM_MESSAGE_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &msg[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_mirrors_status_and_prefixes_message() {
        let err = AdapterError::Upstream {
            status: 503,
            message: "overloaded".into(),
        };
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, serde_json::json!({ "error": "Erro na IA: overloaded" }));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = AdapterError::Transport("connection refused (os error 111)".into());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        let err = AdapterError::InvalidRequest("expected value at line 1".into());
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "expected value at line 1");
    }

    #[test]
    fn test_sanitize_plain_text_body() {
        assert_eq!(sanitize_upstream_error(b"  overloaded\n"), "overloaded");
    }

    #[test]
    fn test_sanitize_extracts_json_error_message() {
        let body = br#"{"error":{"message":"quota exceeded","code":429}}"#;
        assert_eq!(sanitize_upstream_error(body), "quota exceeded");

        let body = br#"{"error":"bad channel"}"#;
        assert_eq!(sanitize_upstream_error(body), "bad channel");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let body = "é".repeat(400);
        let out = sanitize_upstream_error(body.as_bytes());
        assert!(out.ends_with("..."));
        assert!(out.len() <= MAX_UPSTREAM_MESSAGE_LEN + 3);
    }
}
