//! Farescout: fan-out flight-search orchestration
//!
//! Explores a space of `(departure, return)` date pairs by driving one
//! remote browser per pair through a vision/action loop, streaming
//! progressive events and analyses to a single subscriber per request.
//!
//! Embedding layers construct the process-wide pieces once (circuit
//! breaker, event bus, service clients), wrap them in a
//! [`worker::WorkerContext`], and hand requests to
//! [`orchestrator::SearchOrchestrator`].

pub mod analyzer;
pub mod browser;
pub mod captcha;
pub mod config;
pub mod model;
pub mod orchestrator;
pub mod reliability;
pub mod search_events;
pub mod session;
pub mod vision;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{CaptchaMode, RetryMode, SearchConfig, Viewport};
pub use model::{
    Aggregate, Analysis, DatePair, FailureKind, Flight, RequestError, SearchRequest,
    WorkerFailure, WorkerResult, expand_date_pairs, parse_price,
};
pub use orchestrator::{SearchOrchestrator, SearchOutcome, preview_pairs};
pub use reliability::{CircuitBreaker, CircuitState};
pub use search_events::{SearchEvent, SearchEventBus, SseFrameBuffer, encode_frame};
pub use session::{HttpSessionProvider, SessionHandle, SessionProvider};
pub use worker::{Worker, WorkerContext};

use std::sync::Arc;

/// Initialize process logging from `RUST_LOG` (default level: info).
///
/// Idempotent; embedding binaries call this once at startup.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Wire a [`worker::WorkerContext`] with the production service clients.
///
/// The circuit breaker and event bus are passed in rather than created
/// here: the breaker is shared across every request in the process, and
/// each request brings its own bus.
#[must_use]
pub fn production_context(
    config: Arc<SearchConfig>,
    breaker: Arc<CircuitBreaker>,
    events: Arc<SearchEventBus>,
) -> Arc<WorkerContext> {
    let provider = Arc::new(HttpSessionProvider::new(
        Arc::clone(&config),
        Arc::clone(&breaker),
    ));
    let connector = Arc::new(browser::CdpConnector::new(
        config.viewport,
        browser::InterceptionPolicy::default(),
    ));
    let vision = Arc::new(vision::GeminiVision::new(config.llm.clone()));
    let sidecar = Arc::new(captcha::HttpCaptchaSidecar::new(config.sidecar_url.clone()));
    Arc::new(WorkerContext::new(
        config,
        provider,
        connector,
        vision,
        sidecar,
        Arc::new(captcha::HumanSolveRegistry::new()),
        events,
    ))
}
