use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_adapter(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.request_body_limit_bytes == 0 {
        return Err(validation_err(
            "server.request_body_limit_bytes must be greater than 0",
        ));
    }
    if server.http_pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "server.http_pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if upstream.api_key.trim().is_empty() {
        return Err(validation_err(format!(
            "upstream.api_key is required (set {} or upstream.api_key)",
            super::ENV_API_KEY
        )));
    }
    if upstream.channel_id.trim().is_empty() {
        return Err(validation_err("upstream.channel_id cannot be empty"));
    }

    let endpoint = url::Url::parse(&upstream.endpoint).map_err(|err| {
        validation_err(format!(
            "upstream.endpoint '{}' is not a valid URL: {err}",
            upstream.endpoint
        ))
    })?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "upstream.endpoint must use http or https, got '{}'",
            endpoint.scheme()
        )));
    }

    if let Some(proxy) = upstream.proxy.as_deref() {
        if url::Url::parse(proxy).is_err() {
            return Err(validation_err(format!(
                "upstream.proxy '{proxy}' is not a valid URL"
            )));
        }
    }
    Ok(())
}

fn validate_adapter(config: &AppConfig) -> Result<(), ConfigError> {
    let adapter = &config.adapter;
    if adapter.model_name.trim().is_empty() {
        return Err(validation_err("adapter.model_name cannot be empty"));
    }
    if adapter.max_line_bytes == 0 {
        return Err(validation_err(
            "adapter.max_line_bytes must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}
