//! Configuration loading and types
//!
//! All runtime tuning flows through [`SearchConfig`]; see `env.rs` for the
//! environment keys and defaults.

mod env;
mod types;

pub use env::ConfigError;
pub use types::{
    CaptchaMode, LlmSettings, ProviderSettings, ProxyCredentials, ProxySettings, RetryMode,
    SearchConfig, Viewport,
};

/// Fully-populated config for tests: local endpoints, tiny timeouts.
#[cfg(test)]
pub(crate) fn test_config() -> SearchConfig {
    use std::time::Duration;

    SearchConfig {
        provider: ProviderSettings {
            api_key: "test-key".into(),
            project_id: "test-project".into(),
            base_url: "http://127.0.0.1:1".into(),
        },
        llm: LlmSettings {
            api_key: "test-key".into(),
            model: "test-model".into(),
            base_url: "http://127.0.0.1:1".into(),
        },
        proxy: ProxySettings::default(),
        sidecar_url: "http://127.0.0.1:1".into(),
        captcha_mode: CaptchaMode::Ai,
        human_solve_timeout: Duration::from_millis(50),
        concurrency_limit: 3,
        worker_deadline: Duration::from_secs(120),
        worker_retries: 1,
        retry_mode: RetryMode::Bounded,
        max_iter_extract: 10,
        max_iter_captcha: 15,
        viewport: Viewport::default(),
        country_code: "US".into(),
    }
}
