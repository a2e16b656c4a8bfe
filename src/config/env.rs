//! Environment-variable configuration loading
//!
//! Builds a [`SearchConfig`] from process environment. Missing credentials
//! are configuration errors and abort the request before any worker runs.

use std::time::Duration;

use super::types::{
    CaptchaMode, LlmSettings, ProviderSettings, ProxyCredentials, ProxySettings, RetryMode,
    SearchConfig, Viewport,
};

/// Configuration loading errors. All of these are fatal (kind
/// `configuration` in the event stream).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

fn proxy_from_env(prefix: &str) -> Option<ProxyCredentials> {
    let host = optional(&format!("{prefix}_HOST"))?;
    let port = optional(&format!("{prefix}_PORT"))?.parse().ok()?;
    Some(ProxyCredentials {
        host,
        port,
        username: optional(&format!("{prefix}_USERNAME")),
        password: optional(&format!("{prefix}_PASSWORD")),
    })
}

impl SearchConfig {
    /// Load configuration from the process environment.
    ///
    /// Required: `BROWSER_PROVIDER_API_KEY`, `BROWSER_PROVIDER_PROJECT_ID`,
    /// `LLM_API_KEY`. Everything else falls back to documented defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = ProviderSettings {
            api_key: required("BROWSER_PROVIDER_API_KEY")?,
            project_id: required("BROWSER_PROVIDER_PROJECT_ID")?,
            base_url: optional("BROWSER_PROVIDER_URL")
                .unwrap_or_else(|| "https://api.browser-provider.dev".to_string()),
        };

        let llm = LlmSettings {
            api_key: required("LLM_API_KEY")?,
            model: optional("LLM_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            base_url: optional("LLM_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
        };

        let proxy = ProxySettings {
            primary: proxy_from_env("PROXY"),
            alternate: proxy_from_env("PROXY_ALT"),
            provider_builtin: parse_var("PROVIDER_PROXY_ENABLED", false)?,
        };

        let captcha_mode = match optional("CAPTCHA_MODE").as_deref() {
            None | Some("ai") => CaptchaMode::Ai,
            Some("human") => CaptchaMode::Human,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "CAPTCHA_MODE",
                    value: other.to_string(),
                });
            }
        };

        let retry_mode = match optional("RETRY_ENABLED").as_deref() {
            None | Some("bounded") | Some("on") => RetryMode::Bounded,
            Some("off") => RetryMode::Off,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "RETRY_ENABLED",
                    value: other.to_string(),
                });
            }
        };

        let worker_retries: u32 = parse_var("WORKER_RETRIES", 1)?;
        if worker_retries > 1 {
            return Err(ConfigError::InvalidValue {
                key: "WORKER_RETRIES",
                value: worker_retries.to_string(),
            });
        }

        Ok(Self {
            provider,
            llm,
            proxy,
            sidecar_url: optional("CAPTCHA_SIDECAR_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8099".to_string()),
            captcha_mode,
            human_solve_timeout: Duration::from_millis(parse_var(
                "HUMAN_SOLVE_TIMEOUT_MS",
                300_000u64,
            )?),
            concurrency_limit: parse_var("CONCURRENCY_LIMIT", 3usize)?.max(1),
            worker_deadline: Duration::from_millis(parse_var("WORKER_DEADLINE_MS", 60_000u64)?),
            worker_retries,
            retry_mode,
            max_iter_extract: parse_var("MAX_ITER_EXTRACT", 10u32)?,
            max_iter_captcha: parse_var("MAX_ITER_CAPTCHA", 15u32)?,
            viewport: Viewport {
                width: parse_var("VIEWPORT_WIDTH", 1440u32)?,
                height: parse_var("VIEWPORT_HEIGHT", 900u32)?,
            },
            country_code: optional("COUNTRY_CODE").unwrap_or_else(|| "US".to_string()),
        })
    }
}
