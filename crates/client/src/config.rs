//! Client configuration loaded from environment variables.

use std::time::Duration;

use vidgen_core::backoff::BackoffConfig;

use crate::api::{VideoParameters, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Default per-request HTTP timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Errors raised while reading configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Everything the job client needs to talk to the generation service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The single static credential. Absence is only reported when a
    /// generation is attempted.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub parameters: VideoParameters,
    pub backoff: BackoffConfig,
    /// Upper bound on a whole invocation. `None` polls until the job ends.
    pub deadline: Option<Duration>,
    /// Timeout applied to each individual HTTP request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            parameters: VideoParameters::default(),
            backoff: BackoffConfig::default(),
            deadline: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Default                                            |
    /// |-----------------------------|----------------------------------------------------|
    /// | `GEMINI_API_KEY`            | falls back to `API_KEY`, else unset                |
    /// | `VEO_BASE_URL`              | `https://generativelanguage.googleapis.com/v1beta` |
    /// | `VEO_MODEL`                 | `veo-2.0-generate-001`                             |
    /// | `POLL_INITIAL_DELAY_MS`     | `10000`                                            |
    /// | `POLL_MAX_DELAY_MS`         | `60000`                                            |
    /// | `POLL_MAX_JITTER_MS`        | `1000`                                             |
    /// | `GENERATION_DEADLINE_SECS`  | unset (no deadline)                                |
    /// | `REQUEST_TIMEOUT_SECS`      | `60`                                               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let api_key = get("GEMINI_API_KEY").or_else(|| get("API_KEY"));
        let base_url = get("VEO_BASE_URL").unwrap_or(defaults.base_url);
        let model = get("VEO_MODEL").unwrap_or(defaults.model);

        let backoff = BackoffConfig {
            initial_delay: parse_millis("POLL_INITIAL_DELAY_MS", get("POLL_INITIAL_DELAY_MS"))?
                .unwrap_or(defaults.backoff.initial_delay),
            max_delay: parse_millis("POLL_MAX_DELAY_MS", get("POLL_MAX_DELAY_MS"))?
                .unwrap_or(defaults.backoff.max_delay),
            max_jitter: parse_millis("POLL_MAX_JITTER_MS", get("POLL_MAX_JITTER_MS"))?
                .unwrap_or(defaults.backoff.max_jitter),
            ..defaults.backoff
        };

        validate_backoff(&backoff)?;

        let deadline = parse_secs("GENERATION_DEADLINE_SECS", get("GENERATION_DEADLINE_SECS"))?;
        let request_timeout = parse_secs("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"))?
            .unwrap_or(defaults.request_timeout);

        Ok(Self {
            api_key,
            base_url,
            model,
            parameters: defaults.parameters,
            backoff,
            deadline,
            request_timeout,
        })
    }

    /// Build the shared HTTP client with the configured request timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }
}

/// The poll loop only backs off if it starts from a positive delay that
/// fits under the cap.
fn validate_backoff(backoff: &BackoffConfig) -> Result<(), ConfigError> {
    if backoff.initial_delay.is_zero() {
        return Err(ConfigError::Invalid {
            var: "POLL_INITIAL_DELAY_MS",
            value: "0".to_string(),
            expected: "greater than zero",
        });
    }
    if backoff.initial_delay > backoff.max_delay {
        return Err(ConfigError::Invalid {
            var: "POLL_MAX_DELAY_MS",
            value: backoff.max_delay.as_millis().to_string(),
            expected: "at least POLL_INITIAL_DELAY_MS",
        });
    }
    Ok(())
}

fn parse_u64(var: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var,
                value: v,
                expected: "a non-negative integer",
            })
        })
        .transpose()
}

fn parse_millis(var: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_u64(var, value)?.map(Duration::from_millis))
}

fn parse_secs(var: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_u64(var, value)?.map(Duration::from_secs))
}
