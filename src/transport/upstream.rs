use http::{header, HeaderValue};
use reqwest::multipart::Form;

use super::http_transport::build_reqwest_client;
use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::{sanitize_upstream_error, AdapterError};
use crate::protocol::agent::{
    ConversationTurn, API_KEY_HEADER, EMPTY_USER_INFO, FIELD_CHANNEL_ID, FIELD_MESSAGE,
    FIELD_THREAD_ID, FIELD_USER_INFO,
};

/// Client for the single agent-chat endpoint of this deployment.
///
/// Each call is one attempt; failures are reported to the caller, never retried.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: HeaderValue,
    channel_id: String,
}

impl UpstreamClient {
    /// Build the client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when the endpoint, API key or proxy
    /// cannot be used, and [`AdapterError::Transport`] when the HTTP client
    /// cannot be constructed.
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, AdapterError> {
        let endpoint = url::Url::parse(&upstream.endpoint).map_err(|err| {
            AdapterError::Config(format!("Invalid upstream endpoint: {err}"))
        })?;
        let mut api_key = HeaderValue::from_str(upstream.api_key.trim())
            .map_err(|_| AdapterError::Config("Upstream API key is not a valid header value".into()))?;
        api_key.set_sensitive(true);

        Ok(Self {
            client: build_reqwest_client(server, upstream.proxy.as_deref())?,
            endpoint,
            api_key,
            channel_id: upstream.channel_id.clone(),
        })
    }

    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    #[must_use]
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// Start a new turn on a fresh thread of the configured channel.
    #[must_use]
    pub fn new_turn(&self, user_message: impl Into<String>) -> ConversationTurn {
        ConversationTurn::new(self.channel_id.clone(), user_message)
    }

    /// Send one conversation turn and return the response once the upstream
    /// has answered with a success status. The body is left unread for the
    /// caller to stream.
    ///
    /// The multipart encoder sets `Content-Type` with its generated boundary;
    /// no explicit content type is sent. The request body and the response
    /// share one hyper connection, so the upstream may start answering before
    /// the form is fully flushed.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Upstream`] with the drained error body when the
    /// status is not 2xx, and [`AdapterError::Transport`] when the request or
    /// the error body read fails.
    pub async fn send_turn(
        &self,
        turn: &ConversationTurn,
    ) -> Result<reqwest::Response, AdapterError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, self.api_key.clone())
            .header(header::CONNECTION, HeaderValue::from_static("keep-alive"))
            .multipart(build_turn_form(turn))
            .send()
            .await
            .map_err(|err| AdapterError::Transport(format!("Upstream request failed: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| AdapterError::Transport(format!("Failed to read error body: {e}")))?;
        let message = sanitize_upstream_error(&body_bytes);
        tracing::error!(
            status = status.as_u16(),
            thread_id = %turn.thread_id,
            message = %message,
            "upstream rejected request"
        );
        Err(AdapterError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

/// Multipart form for one turn: `channel_id`, `thread_id`, `user_info`, `message`.
#[must_use]
pub fn build_turn_form(turn: &ConversationTurn) -> Form {
    Form::new()
        .text(FIELD_CHANNEL_ID, turn.channel_id.clone())
        .text(FIELD_THREAD_ID, turn.thread_id.clone())
        .text(FIELD_USER_INFO, EMPTY_USER_INFO)
        .text(FIELD_MESSAGE, turn.user_message.clone())
}
