//! Runtime configuration types for the search orchestrator
//!
//! Every field here is driven by an environment variable (see `env.rs`) and
//! every option has an effect at runtime; nothing is decorative.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Viewport dimensions applied to every remote-browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

/// Credentials for an external HTTP proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Proxy resolution inputs, in priority order: `primary`, then `alternate`,
/// then the provider's built-in proxy (when enabled), then none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    pub primary: Option<ProxyCredentials>,
    pub alternate: Option<ProxyCredentials>,
    /// Allow falling back to the provider-managed residential proxy.
    pub provider_builtin: bool,
}

/// Remote-browser provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: String,
    pub project_id: String,
    /// REST base URL of the session provider.
    pub base_url: String,
}

/// Vision / analysis LLM settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// CAPTCHA handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptchaMode {
    /// Delegate to the solving sidecar.
    Ai,
    /// Emit `captcha_detected` and wait for an external solved signal.
    Human,
}

/// Outer per-worker retry policy selector.
///
/// `Bounded` applies a wall deadline per attempt plus a bounded retry count;
/// `Off` lets a worker probe indefinitely with no deadline and no retry.
/// The two policies are never combined in a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    Off,
    Bounded,
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub provider: ProviderSettings,
    pub llm: LlmSettings,
    pub proxy: ProxySettings,

    /// Base URL of the CAPTCHA-solving sidecar.
    pub sidecar_url: String,
    pub captcha_mode: CaptchaMode,
    /// How long human mode waits for a solved signal before giving up.
    pub human_solve_timeout: Duration,

    /// Workers launched per batch. Batches are strictly sequential.
    pub concurrency_limit: usize,
    /// Per-attempt wall deadline for a worker (Bounded mode only).
    pub worker_deadline: Duration,
    /// Retries per worker, 0 or 1 (Bounded mode only).
    pub worker_retries: u32,
    pub retry_mode: RetryMode,

    /// Iteration cap for the extraction agent loop.
    pub max_iter_extract: u32,
    /// Iteration cap for the CAPTCHA solve loop.
    pub max_iter_captcha: u32,

    pub viewport: Viewport,
    /// ISO country code driving the session fingerprint locales.
    pub country_code: String,
}

impl SearchConfig {
    /// Fingerprint locale list derived from the configured country.
    #[must_use]
    pub fn locales(&self) -> Vec<String> {
        vec![format!("en-{}", self.country_code.to_uppercase())]
    }
}
