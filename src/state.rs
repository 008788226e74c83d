use crate::config::AppConfig;
use crate::error::AdapterError;
use crate::transport::UpstreamClient;

/// Shared application state accessible to all handlers.
///
/// Built once at startup and read-only afterwards; requests share it through
/// an `Arc` and keep all per-stream state to themselves.
#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub upstream: UpstreamClient,
}

impl AppState {
    /// Build the state, including the pooled upstream client.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] or [`AdapterError::Transport`] when the
    /// upstream client cannot be created from `config`.
    pub fn new(config: AppConfig) -> Result<Self, AdapterError> {
        let upstream = UpstreamClient::new(&config.server, &config.upstream)?;
        Ok(Self { config, upstream })
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.config.adapter.model_name
    }
}
