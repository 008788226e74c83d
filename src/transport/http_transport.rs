use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::AdapterError;

/// Build the pooled reqwest client used for the upstream.
///
/// No total request timeout is set: completions may stream for as long as the
/// upstream keeps the body open. Only the connect phase is bounded.
///
/// # Errors
///
/// Returns [`AdapterError::Config`] when the proxy URL is invalid and
/// [`AdapterError::Transport`] when the client cannot be built.
pub fn build_reqwest_client(
    server: &ServerConfig,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, AdapterError> {
    let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(server.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(server.connect_timeout_secs.max(1)))
        .redirect(reqwest::redirect::Policy::none());

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| AdapterError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !server.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| AdapterError::Transport(format!("Failed to build HTTP client: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_client() {
        assert!(build_reqwest_client(&ServerConfig::default(), None).is_ok());
    }

    #[test]
    fn test_build_with_proxy() {
        let client = build_reqwest_client(&ServerConfig::default(), Some("http://127.0.0.1:3128"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let err = build_reqwest_client(&ServerConfig::default(), Some("http://[::1")).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }
}
