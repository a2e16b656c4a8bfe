//! CAPTCHA sidecar HTTP client
//!
//! The sidecar runs as a separate service with three phases: a strategy
//! plan, an action step, and an assessment of the previous step. All
//! screenshots travel base64-encoded.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Sidecar call failures.
#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    #[error("sidecar transport failure: {0}")]
    Transport(String),

    #[error("sidecar error {status}: {message}")]
    Api { status: u16, message: String },
}

/// Strategy request payload.
#[derive(Debug, Serialize)]
pub struct StrategyRequest {
    pub screenshot: String,
    pub current_url: String,
}

/// Plan returned by the strategy phase.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyResponse {
    #[serde(default)]
    pub reasoning: String,
}

/// Solve request payload.
#[derive(Debug, Serialize)]
pub struct SolveRequest {
    pub screenshot: String,
    pub task: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub current_url: String,
}

/// One solve round-trip's answer.
#[derive(Debug, Clone, Deserialize)]
pub struct SolveResponse {
    #[serde(default)]
    pub success: bool,
    /// Actions in the shared normalized-coordinate action format.
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub complete: bool,
}

/// Assessment request payload.
#[derive(Debug, Serialize)]
pub struct AssessRequest {
    pub screenshot: String,
    pub previous_action: Value,
    pub current_url: String,
}

/// Assessment of the previous action.
#[derive(Debug, Clone, Deserialize)]
pub struct AssessResponse {
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub feedback: String,
}

/// Sidecar operations used by the delegator.
#[async_trait]
pub trait CaptchaSidecar: Send + Sync {
    /// Quick reachability check against the health endpoint.
    async fn healthy(&self) -> bool;

    async fn strategy(&self, request: StrategyRequest) -> Result<StrategyResponse, CaptchaError>;

    async fn solve(&self, request: SolveRequest) -> Result<SolveResponse, CaptchaError>;

    async fn assess(&self, request: AssessRequest) -> Result<AssessResponse, CaptchaError>;
}

const STRATEGY_DEADLINE: Duration = Duration::from_secs(30);
const ASSESS_DEADLINE: Duration = Duration::from_secs(25);
const HEALTH_DEADLINE: Duration = Duration::from_secs(3);

/// reqwest client for a sidecar instance.
pub struct HttpCaptchaSidecar {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCaptchaSidecar {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
        deadline: Option<Duration>,
    ) -> Result<R, CaptchaError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(deadline) = deadline {
            request = request.timeout(deadline);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CaptchaError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CaptchaError::Api { status, message });
        }
        response
            .json()
            .await
            .map_err(|e| CaptchaError::Transport(format!("decode: {e}")))
    }
}

#[async_trait]
impl CaptchaSidecar for HttpCaptchaSidecar {
    async fn healthy(&self) -> bool {
        let probe = self
            .client
            .get(self.url("health"))
            .timeout(HEALTH_DEADLINE)
            .send()
            .await;
        match probe {
            Ok(response) => {
                let ok = response.status().is_success();
                debug!("Sidecar health: {}", if ok { "up" } else { "degraded" });
                ok
            }
            Err(_) => false,
        }
    }

    async fn strategy(&self, request: StrategyRequest) -> Result<StrategyResponse, CaptchaError> {
        self.post("captcha/strategy", &request, Some(STRATEGY_DEADLINE))
            .await
    }

    async fn solve(&self, request: SolveRequest) -> Result<SolveResponse, CaptchaError> {
        self.post("captcha/solve", &request, None).await
    }

    async fn assess(&self, request: AssessRequest) -> Result<AssessResponse, CaptchaError> {
        self.post("captcha/assess", &request, Some(ASSESS_DEADLINE))
            .await
    }
}
