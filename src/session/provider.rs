//! Remote-browser session provider client
//!
//! Creates and tears down provider sessions over its REST API. Session
//! creation is wrapped in bounded retry and gated by the process-wide
//! circuit breaker; teardown is best-effort and never surfaces errors.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::types::{
    CreateSessionRequest, CreateSessionResponse, Fingerprint, LiveViewResponse, ProxyRequest,
    SessionHandle,
};
use crate::config::{ProxyCredentials, SearchConfig};
use crate::model::FailureKind;
use crate::reliability::{
    CircuitBreaker, ECHO_ENDPOINT, RetryPolicy, probe_proxy_health, retry_with_backoff,
};

/// Session provider failures, split along the retry/breaker fault lines.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Circuit breaker rejected the creation without calling the provider.
    #[error("circuit breaker open, session creation rejected")]
    BreakerOpen,

    /// Transient provider failure: network, timeout, 5xx.
    #[error("provider transient failure: {0}")]
    Transient(String),

    /// Permanent provider failure: auth rejection, malformed response.
    #[error("provider rejected session: {0}")]
    Rejected(String),
}

impl SessionError {
    /// Map onto the worker failure taxonomy.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::BreakerOpen => FailureKind::BreakerOpen,
            Self::Transient(_) => FailureKind::ProviderTransient,
            Self::Rejected(_) => FailureKind::ProviderPermanent,
        }
    }
}

/// Session lifecycle operations, as used by workers.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create a fresh session. Applies retry, breaker, and proxy policy.
    async fn create_session(&self) -> Result<SessionHandle, SessionError>;

    /// Fetch the embeddable live-view URL for a session. Non-fatal: `None`
    /// on any failure.
    async fn fetch_live_view_url(&self, session_id: &str) -> Option<String>;

    /// Tear a session down. Best-effort; never surfaces errors.
    async fn close_session(&self, session_id: &str);
}

/// REST client for the remote-browser provider.
pub struct HttpSessionProvider {
    client: reqwest::Client,
    config: Arc<SearchConfig>,
    breaker: Arc<CircuitBreaker>,
}

impl HttpSessionProvider {
    #[must_use]
    pub fn new(config: Arc<SearchConfig>, breaker: Arc<CircuitBreaker>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            breaker,
        }
    }

    fn sessions_url(&self) -> String {
        format!(
            "{}/v1/sessions",
            self.config.provider.base_url.trim_end_matches('/')
        )
    }

    /// Resolve the proxy block for a new session.
    ///
    /// Order: primary external credentials, alternate external credentials,
    /// provider built-in (when enabled), none. External candidates are
    /// health-probed first; an unhealthy proxy falls through to the next
    /// candidate.
    async fn resolve_proxy(&self) -> Option<ProxyRequest> {
        for candidate in [&self.config.proxy.primary, &self.config.proxy.alternate]
            .into_iter()
            .flatten()
        {
            if self.external_proxy_healthy(candidate).await {
                return Some(ProxyRequest::External {
                    server: format!("{}:{}", candidate.host, candidate.port),
                    username: candidate.username.clone(),
                    password: candidate.password.clone(),
                });
            }
            warn!(
                "External proxy {}:{} failed health probe; trying next candidate",
                candidate.host, candidate.port
            );
        }

        if self.config.proxy.provider_builtin {
            return Some(ProxyRequest::Builtin {
                country_code: self.config.country_code.clone(),
            });
        }
        None
    }

    async fn external_proxy_healthy(&self, creds: &ProxyCredentials) -> bool {
        let proxy_url = match (&creds.username, &creds.password) {
            (Some(user), Some(pass)) => {
                format!("http://{user}:{pass}@{}:{}", creds.host, creds.port)
            }
            _ => format!("http://{}:{}", creds.host, creds.port),
        };
        let proxied = reqwest::Proxy::all(&proxy_url)
            .ok()
            .and_then(|proxy| reqwest::Client::builder().proxy(proxy).build().ok());
        match proxied {
            Some(client) => probe_proxy_health(&client, ECHO_ENDPOINT).await,
            None => false,
        }
    }

    /// One raw creation attempt, no retry.
    async fn create_once(
        &self,
        proxy: Option<ProxyRequest>,
    ) -> Result<CreateSessionResponse, SessionError> {
        let body = CreateSessionRequest {
            project_id: self.config.provider.project_id.clone(),
            country_code: self.config.country_code.clone(),
            viewport: self.config.viewport,
            fingerprint: Fingerprint::for_country(&self.config.country_code),
            proxy,
            solve_captchas: false,
        };

        let response = self
            .client
            .post(self.sessions_url())
            .header("x-api-key", &self.config.provider.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Transient(format!("network: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            let text = response.text().await.unwrap_or_default();
            return Err(SessionError::Transient(format!("HTTP {status}: {text}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SessionError::Rejected(format!("HTTP {status}: {text}")));
        }

        response
            .json::<CreateSessionResponse>()
            .await
            .map_err(|e| SessionError::Rejected(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn create_session(&self) -> Result<SessionHandle, SessionError> {
        if !self.breaker.allow() {
            debug!("Session creation rejected: circuit breaker open");
            return Err(SessionError::BreakerOpen);
        }

        let proxy = self.resolve_proxy().await;
        let retryable = |e: &SessionError| {
            matches!(e, SessionError::Transient(_))
                || crate::reliability::default_retryable(&e.to_string())
        };
        let outcome = retry_with_backoff(RetryPolicy::session_creation(), retryable, || {
            self.create_once(proxy.clone())
        })
        .await;

        // Terminal outcome feeds the breaker once, after retries.
        self.breaker.record(outcome.is_ok());

        let created = outcome?;
        info!("Created remote-browser session {}", created.session_id);

        let live_view_url = match self.fetch_live_view_url(&created.session_id).await {
            Some(url) => Some(url),
            None => created.debugger_url.clone(),
        };

        Ok(SessionHandle {
            session_id: created.session_id,
            control_url: created.control_url,
            live_view_url,
            created_at: Utc::now(),
        })
    }

    async fn fetch_live_view_url(&self, session_id: &str) -> Option<String> {
        let url = format!("{}/{session_id}/live-view", self.sessions_url());
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.config.provider.api_key)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let live: LiveViewResponse = response.json().await.ok()?;
        // Prefer the embeddable fullscreen URL, fall back to the debugger.
        live.fullscreen_url.or(live.debugger_url)
    }

    async fn close_session(&self, session_id: &str) {
        let url = format!("{}/{session_id}", self.sessions_url());
        match self
            .client
            .delete(&url)
            .header("x-api-key", &self.config.provider.api_key)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("Closed session {session_id}");
            }
            Ok(response) => {
                warn!(
                    "Session teardown for {session_id} returned HTTP {}",
                    response.status()
                );
            }
            Err(e) => warn!("Session teardown for {session_id} failed: {e}"),
        }
    }
}
