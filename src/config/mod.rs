pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

pub const ENV_CONFIG_PATH: &str = "ADAPTER_CONFIG";
pub const ENV_API_KEY: &str = "IAEDU_API_KEY";
pub const ENV_ENDPOINT: &str = "IAEDU_ENDPOINT";
pub const ENV_CHANNEL_ID: &str = "IAEDU_CHANNEL_ID";
pub const ENV_HOST: &str = "ADAPTER_HOST";
pub const ENV_PORT: &str = "ADAPTER_PORT";
pub const ENV_MODEL_NAME: &str = "ADAPTER_MODEL_NAME";
pub const ENV_LOG_LEVEL: &str = "ADAPTER_LOG_LEVEL";

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid environment variable {name}: {reason}")]
    Env { name: &'static str, reason: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Listener and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_request_body_limit_bytes")]
    pub request_body_limit_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub http_use_env_proxy: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    4000
}
fn default_request_body_limit_bytes() -> usize {
    2 * 1024 * 1024
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}
fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: String::new(),
            request_body_limit_bytes: default_request_body_limit_bytes(),
            runtime_worker_threads: None,
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            http_use_env_proxy: false,
        }
    }
}

/// The single agent-chat service this deployment forwards to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Outward-facing identity and stream decoding limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_owned_by")]
    pub owned_by: String,
    #[serde(default = "default_greeting")]
    pub default_greeting: String,
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,
}

fn default_model_name() -> String {
    "iaedu-custom".to_string()
}
fn default_owned_by() -> String {
    "iaedu".to_string()
}
fn default_greeting() -> String {
    "Olá".to_string()
}
fn default_max_line_bytes() -> usize {
    1024 * 1024
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            owned_by: default_owned_by(),
            default_greeting: default_greeting(),
            max_line_bytes: default_max_line_bytes(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration. Read once at startup, immutable afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Resolve the config file path from `ADAPTER_CONFIG`, falling back to `config.yaml`.
#[must_use]
pub fn config_path_from_env() -> String {
    std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| "config.yaml".to_string())
}

/// Load configuration from an optional YAML file, apply environment overrides
/// and validate the result.
///
/// A missing file is not an error; defaults are used and the environment is
/// expected to supply at least the upstream API key.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading an existing file fails,
/// [`ConfigError::Yaml`] when parsing fails, [`ConfigError::Env`] when an
/// override cannot be parsed, or [`ConfigError::Validation`] when semantic
/// validation fails (including a missing API key).
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    load_config_with_env(path, |name| std::env::var(name).ok())
}

/// [`load_config`] with an injectable environment lookup.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_with_env<F>(path: &str, env: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, env)?;
    validate_config(&config)?;
    Ok(config)
}

/// Overlay environment variables on top of file/default values.
///
/// # Errors
///
/// Returns [`ConfigError::Env`] when `ADAPTER_PORT` is not a valid port number.
pub fn apply_env_overrides<F>(config: &mut AppConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| env(name).filter(|value| !value.trim().is_empty());

    if let Some(api_key) = non_empty(ENV_API_KEY) {
        config.upstream.api_key = api_key;
    }
    if let Some(endpoint) = non_empty(ENV_ENDPOINT) {
        config.upstream.endpoint = endpoint;
    }
    if let Some(channel_id) = non_empty(ENV_CHANNEL_ID) {
        config.upstream.channel_id = channel_id;
    }
    if let Some(host) = non_empty(ENV_HOST) {
        config.server.host = host;
    }
    if let Some(port) = non_empty(ENV_PORT) {
        config.server.port = port.trim().parse().map_err(|err| ConfigError::Env {
            name: ENV_PORT,
            reason: format!("{err}"),
        })?;
    }
    if let Some(model_name) = non_empty(ENV_MODEL_NAME) {
        config.adapter.model_name = model_name;
    }
    if let Some(log_level) = non_empty(ENV_LOG_LEVEL) {
        config.features.log_level = log_level;
    }
    Ok(())
}
