//! Session provider wire types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live remote-browser session owned by exactly one worker.
///
/// `control_url` is the CDP websocket endpoint; `live_view_url` is opaque
/// and forwarded verbatim to the subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: String,
    pub control_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_view_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Browser fingerprint requested from the provider.
///
/// Locales follow the configured country; the screen cap keeps the
/// fingerprint inside common desktop hardware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub locales: Vec<String>,
    pub max_screen_width: u32,
    pub max_screen_height: u32,
}

impl Fingerprint {
    #[must_use]
    pub fn for_country(country_code: &str) -> Self {
        Self {
            locales: vec![format!("en-{}", country_code.to_uppercase())],
            max_screen_width: 1920,
            max_screen_height: 1080,
        }
    }
}

/// Proxy block of a session-creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyRequest {
    /// Route through externally supplied proxy credentials.
    External {
        server: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Use the provider's managed residential proxy.
    Builtin { country_code: String },
}

/// Body of the session-creation call.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub project_id: String,
    pub country_code: String,
    pub viewport: crate::config::Viewport,
    pub fingerprint: Fingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyRequest>,
    /// The provider's own CAPTCHA solver stays off; the orchestrator owns
    /// that path.
    pub solve_captchas: bool,
}

/// Provider's session-creation response.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub control_url: String,
    #[serde(default)]
    pub debugger_url: Option<String>,
}

/// Provider's live-view lookup response.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveViewResponse {
    #[serde(default)]
    pub fullscreen_url: Option<String>,
    #[serde(default)]
    pub debugger_url: Option<String>,
}
