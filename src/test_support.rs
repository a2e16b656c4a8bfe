//! Scriptable in-memory fakes for the service seams
//!
//! Scenario tests drive the worker and orchestrator against these instead
//! of live services. Fakes default to the happy path; individual tests
//! script failures, page states, and CAPTCHA behavior.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::browser::{Action, ActionOutcome, BrowserConnector, PageDriver, Screenshot};
use crate::captcha::{
    AssessRequest, AssessResponse, CaptchaError, CaptchaSidecar, HumanSolveRegistry,
    SolveRequest, SolveResponse, StrategyRequest, StrategyResponse,
};
use crate::config::{SearchConfig, Viewport};
use crate::search_events::SearchEventBus;
use crate::session::{SessionError, SessionHandle, SessionProvider};
use crate::vision::{
    ExtractionChat, ModelTurn, PageState, ReadinessVerdict, VisionError, VisionModel,
};
use crate::worker::WorkerContext;

// ── Session provider ──────────────────────────────────────────────

/// Scriptable session provider. Consumes scripted outcomes per creation;
/// once the script is empty every creation succeeds.
#[derive(Default)]
pub(crate) struct FakeProvider {
    script: Mutex<VecDeque<Result<(), SessionError>>>,
    counter: AtomicU32,
    pub closed: AtomicU32,
    open: Mutex<HashSet<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: Vec<Result<(), SessionError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }

    pub fn created_count(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn create_session(&self) -> Result<SessionHandle, SessionError> {
        if let Some(outcome) = self.script.lock().pop_front() {
            outcome?;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("sess-{n}");
        self.open.lock().insert(session_id.clone());
        Ok(SessionHandle {
            session_id: session_id.clone(),
            control_url: format!("ws://fake-cdp/{session_id}"),
            live_view_url: Some(format!("https://live.fake/{session_id}")),
            created_at: Utc::now(),
        })
    }

    async fn fetch_live_view_url(&self, session_id: &str) -> Option<String> {
        Some(format!("https://live.fake/{session_id}"))
    }

    async fn close_session(&self, session_id: &str) {
        self.open.lock().remove(session_id);
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Page driver ───────────────────────────────────────────────────

/// In-memory page: the screenshot payload is the current URL's bytes, so
/// fakes downstream can key behavior off what the page shows.
pub(crate) struct FakePage {
    url: Mutex<String>,
}

impl FakePage {
    fn new() -> Self {
        Self {
            url: Mutex::new("about:blank".to_string()),
        }
    }

    /// Standalone page for tests that drive a component directly.
    pub fn for_tests() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn screenshot(&self) -> anyhow::Result<Screenshot> {
        let url = self.url.lock().clone();
        Ok(Screenshot {
            data: url.clone().into_bytes(),
            url,
        })
    }

    async fn current_url(&self) -> String {
        self.url.lock().clone()
    }

    fn viewport(&self) -> Viewport {
        Viewport::default()
    }

    async fn execute(&self, action: &Action) -> ActionOutcome {
        if let Action::Navigate { url } = action {
            *self.url.lock() = url.clone();
        }
        if matches!(action, Action::Unsupported { .. }) {
            return ActionOutcome::unimplemented();
        }
        ActionOutcome::success()
    }

    async fn navigate(&self, url: &str, _deadline: Duration) -> anyhow::Result<()> {
        *self.url.lock() = url.to_string();
        Ok(())
    }
}

/// Hands out a fresh [`FakePage`] per session.
#[derive(Default)]
pub(crate) struct FakeConnector;

#[async_trait]
impl BrowserConnector for FakeConnector {
    async fn attach(&self, _handle: &SessionHandle) -> anyhow::Result<Box<dyn PageDriver>> {
        Ok(Box::new(FakePage::new()))
    }
}

// ── Vision model ──────────────────────────────────────────────────

fn ready_verdict() -> ReadinessVerdict {
    ReadinessVerdict {
        is_ready: true,
        page_state: PageState::ResultsReady,
        confidence: 0.95,
        reasoning: "flight cards rendered".to_string(),
    }
}

pub(crate) fn verdict(page_state: PageState, is_ready: bool) -> ReadinessVerdict {
    ReadinessVerdict {
        is_ready,
        page_state,
        confidence: 0.9,
        reasoning: "scripted".to_string(),
    }
}

pub(crate) fn default_extraction_text() -> String {
    json!({
        "flights": [
            {"airline": "TestAir", "price": "$900", "duration": "10h", "route": "YVR-DEL"},
            {"airline": "OtherAir", "price": "$1,150", "duration": "9h", "route": "YVR-DEL"}
        ],
        "summary": "two options"
    })
    .to_string()
}

/// Scriptable vision model.
///
/// `verdict_script` is consumed one probe at a time, then probes default
/// to results-ready - unless the screenshot contains `stall_marker`, in
/// which case the page reads as forever loading. Extraction turns consume
/// `extraction_script`, then default to a final structured answer.
/// `analyze` always fails, forcing the deterministic digest.
#[derive(Default)]
pub(crate) struct FakeVision {
    pub verdict_script: Mutex<VecDeque<ReadinessVerdict>>,
    pub extraction_script: Mutex<VecDeque<ModelTurn>>,
    pub stall_marker: Option<String>,
    pub probes: AtomicU32,
}

impl FakeVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stalling_on(marker: impl Into<String>) -> Self {
        Self {
            stall_marker: Some(marker.into()),
            ..Self::default()
        }
    }

    pub fn with_verdicts(verdicts: Vec<ReadinessVerdict>) -> Self {
        Self {
            verdict_script: Mutex::new(verdicts.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl VisionModel for FakeVision {
    async fn classify_page(&self, screenshot_png: &[u8]) -> Result<ReadinessVerdict, VisionError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.stall_marker {
            let shown = String::from_utf8_lossy(screenshot_png);
            if shown.contains(marker.as_str()) {
                return Ok(verdict(PageState::Loading, false));
            }
        }
        if let Some(scripted) = self.verdict_script.lock().pop_front() {
            return Ok(scripted);
        }
        Ok(ready_verdict())
    }

    async fn extraction_turn(&self, _chat: &ExtractionChat) -> Result<ModelTurn, VisionError> {
        if let Some(turn) = self.extraction_script.lock().pop_front() {
            return Ok(turn);
        }
        Ok(ModelTurn::Text(default_extraction_text()))
    }

    async fn analyze(&self, _prompt: &str) -> Result<Value, VisionError> {
        Err(VisionError::Transport("analysis disabled in tests".into()))
    }
}

// ── CAPTCHA sidecar ───────────────────────────────────────────────

/// Scriptable sidecar. `complete_after` counts solve calls; `None` never
/// completes.
pub(crate) struct FakeSidecar {
    pub reachable: bool,
    pub complete_after: Option<u32>,
    pub solve_calls: AtomicU32,
    pub assess_calls: AtomicU32,
}

impl Default for FakeSidecar {
    fn default() -> Self {
        Self {
            reachable: true,
            complete_after: Some(1),
            solve_calls: AtomicU32::new(0),
            assess_calls: AtomicU32::new(0),
        }
    }
}

impl FakeSidecar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn never_completing() -> Self {
        Self {
            complete_after: None,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CaptchaSidecar for FakeSidecar {
    async fn healthy(&self) -> bool {
        self.reachable
    }

    async fn strategy(&self, _request: StrategyRequest) -> Result<StrategyResponse, CaptchaError> {
        Ok(StrategyResponse {
            reasoning: "click the checkbox".to_string(),
        })
    }

    async fn solve(&self, _request: SolveRequest) -> Result<SolveResponse, CaptchaError> {
        let calls = self.solve_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let complete = self.complete_after.is_some_and(|n| calls >= n);
        Ok(SolveResponse {
            success: true,
            actions: if complete {
                Vec::new()
            } else {
                vec![json!({"type": "click", "x": 480, "y": 505})]
            },
            message: "working on it".to_string(),
            complete,
        })
    }

    async fn assess(&self, _request: AssessRequest) -> Result<AssessResponse, CaptchaError> {
        self.assess_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AssessResponse {
            complete: false,
            feedback: "not solved yet".to_string(),
        })
    }
}

// ── Context builder ───────────────────────────────────────────────

pub(crate) struct ContextBuilder {
    config: SearchConfig,
    provider: Arc<FakeProvider>,
    vision: Arc<FakeVision>,
    sidecar: Arc<FakeSidecar>,
    events: Arc<SearchEventBus>,
}

impl ContextBuilder {
    pub fn config(mut self, f: impl FnOnce(&mut SearchConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn provider(mut self, provider: FakeProvider) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    pub fn vision(mut self, vision: FakeVision) -> Self {
        self.vision = Arc::new(vision);
        self
    }

    pub fn sidecar(mut self, sidecar: FakeSidecar) -> Self {
        self.sidecar = Arc::new(sidecar);
        self
    }

    pub fn provider_handle(&self) -> Arc<FakeProvider> {
        Arc::clone(&self.provider)
    }

    pub fn events_handle(&self) -> Arc<SearchEventBus> {
        Arc::clone(&self.events)
    }

    pub fn build(self) -> Arc<WorkerContext> {
        Arc::new(WorkerContext::new(
            Arc::new(self.config),
            self.provider,
            Arc::new(FakeConnector),
            self.vision,
            self.sidecar,
            Arc::new(HumanSolveRegistry::new()),
            self.events,
        ))
    }
}

/// Happy-path builder: successful provider, instantly-ready pages, one
/// scripted flight list, solvable CAPTCHAs.
pub(crate) fn context_builder() -> ContextBuilder {
    ContextBuilder {
        config: crate::config::test_config(),
        provider: Arc::new(FakeProvider::new()),
        vision: Arc::new(FakeVision::new()),
        sidecar: Arc::new(FakeSidecar::new()),
        events: Arc::new(SearchEventBus::with_capacity(2048)),
    }
}
